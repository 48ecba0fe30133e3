//! Model calls bounded by the configured model timeout.

use std::time::Duration;

use pilot_core::error::ModelError;
use pilot_core::message::Message;
use pilot_core::model::{LanguageModel, TokenStream};

/// `generate` with a wall-clock limit; an expired limit is a
/// [`ModelError::Timeout`].
pub async fn generate_within(
    model: &dyn LanguageModel,
    prompt: &str,
    history: &[Message],
    system_prompt: &str,
    limit: Duration,
) -> Result<String, ModelError> {
    tokio::time::timeout(limit, model.generate(prompt, history, system_prompt))
        .await
        .map_err(|_| ModelError::Timeout(format!("no reply within {} ms", limit.as_millis())))?
}

/// `generate_stream` with the same limit on opening the stream.
pub async fn open_stream_within(
    model: &dyn LanguageModel,
    prompt: &str,
    history: &[Message],
    system_prompt: &str,
    images: &[String],
    limit: Duration,
) -> Result<TokenStream, ModelError> {
    tokio::time::timeout(limit, model.generate_stream(prompt, history, system_prompt, images))
        .await
        .map_err(|_| ModelError::Timeout(format!("stream not opened within {} ms", limit.as_millis())))?
}

/// Next streamed token. `None` at the end of the stream; a stream that
/// stays silent for `limit` is reported as interrupted.
pub async fn next_token(
    tokens: &mut TokenStream,
    limit: Duration,
) -> Option<Result<String, ModelError>> {
    match tokio::time::timeout(limit, tokens.recv()).await {
        Ok(token) => token,
        Err(_) => Some(Err(ModelError::StreamInterrupted(format!(
            "no token for {} ms",
            limit.as_millis()
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::StallingModel;

    const LIMIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn silent_model_times_out() {
        let err = generate_within(&StallingModel, "hi", &[], "", LIMIT).await.unwrap_err();
        assert!(matches!(err, ModelError::Timeout(_)));
        assert!(err.to_string().contains("50 ms"));
    }

    #[tokio::test]
    async fn stalled_stream_is_interrupted() {
        let mut tokens = open_stream_within(&StallingModel, "hi", &[], "", &[], LIMIT)
            .await
            .unwrap();
        assert_eq!(next_token(&mut tokens, LIMIT).await.unwrap().unwrap(), "Sto ");
        let err = next_token(&mut tokens, LIMIT).await.unwrap().unwrap_err();
        assert!(matches!(err, ModelError::StreamInterrupted(_)));
    }
}
