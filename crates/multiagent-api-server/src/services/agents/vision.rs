use super::{HandlerReply, RoutingDecision};
use crate::services::error::AgentError;
use crate::services::providers::VisionProvider;
use crate::services::session::Session;
use std::sync::Arc;
use tracing::{error, info};

pub const NO_IMAGE_MESSAGE: &str = "⚠️ Nessuna immagine caricata.";

/// Q&A on the last uploaded image only. Vision model failures become a
/// user-visible string; the exchange is then left out of memory.
pub struct VisionHandler {
    vlm: Arc<dyn VisionProvider>,
}

impl VisionHandler {
    pub fn new(vlm: Arc<dyn VisionProvider>) -> Self {
        Self { vlm }
    }

    pub async fn handle(&self, message: &str, session: &mut Session) -> Result<HandlerReply, AgentError> {
        let Some(image) = session.latest_image().map(|img| img.to_input()) else {
            info!("No image for session {}, skipping vision model", session.id);
            return Ok(HandlerReply::new(RoutingDecision::Vision, NO_IMAGE_MESSAGE));
        };

        info!(
            "🛠️ Vision agent for session {} ({}, {} bytes)",
            session.id,
            image.mime,
            image.bytes.len()
        );

        let checkpoint = session.memory.len();
        session.memory.add_user_message(message);

        match self.vlm.generate_with_images(message, &[image]).await {
            Ok(answer) => {
                session.memory.add_ai_message(answer.clone());
                Ok(HandlerReply::new(RoutingDecision::Vision, answer))
            }
            Err(e) => {
                error!("❌ Vision model failed for session {}: {:#}", session.id, e);
                session.memory.truncate(checkpoint);
                Ok(HandlerReply::new(
                    RoutingDecision::Vision,
                    format!("❌ Errore VLM Q&A: {}", e),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::MockVisionProvider;
    use crate::services::session::{ImageRef, Turn};
    use bytes::Bytes;

    fn session_with_images(images: &[&'static [u8]]) -> Session {
        let mut session = Session::new("s");
        for bytes in images {
            session.images.push(ImageRef::new(Bytes::from_static(bytes), None));
        }
        session
    }

    #[tokio::test]
    async fn test_no_image_never_calls_model() {
        let mut vlm = MockVisionProvider::new();
        vlm.expect_generate_with_images().times(0);

        let handler = VisionHandler::new(Arc::new(vlm));
        let mut session = Session::new("s");
        let reply = handler.handle("cosa vedi?", &mut session).await.unwrap();

        assert_eq!(reply.answer, NO_IMAGE_MESSAGE);
        assert!(session.memory.is_empty());
    }

    #[tokio::test]
    async fn test_only_latest_image_is_sent() {
        let mut vlm = MockVisionProvider::new();
        vlm.expect_generate_with_images()
            .withf(|text, images| {
                text == "cosa vedi nella foto?" && images.len() == 1 && images[0].bytes.as_ref() == b"third"
            })
            .times(1)
            .returning(|_, _| Ok("Un gatto sul divano.".to_string()));

        let handler = VisionHandler::new(Arc::new(vlm));
        let mut session = session_with_images(&[b"first", b"second", b"third"]);
        let reply = handler.handle("cosa vedi nella foto?", &mut session).await.unwrap();

        assert_eq!(reply.strategy, RoutingDecision::Vision);
        assert_eq!(
            session.memory.turns(),
            &[
                Turn::user("cosa vedi nella foto?"),
                Turn::assistant("Un gatto sul divano.")
            ]
        );
    }

    #[tokio::test]
    async fn test_model_failure_becomes_error_string() {
        let mut vlm = MockVisionProvider::new();
        vlm.expect_generate_with_images()
            .returning(|_, _| Err(anyhow::anyhow!("quota exceeded")));

        let handler = VisionHandler::new(Arc::new(vlm));
        let mut session = session_with_images(&[b"img"]);
        session.memory.add_user_message("prima");
        session.memory.add_ai_message("ok");

        let reply = handler.handle("cosa vedi?", &mut session).await.unwrap();
        assert_eq!(reply.answer, "❌ Errore VLM Q&A: quota exceeded");
        assert_eq!(session.memory.len(), 2);
    }
}
