use std::sync::Arc;

use chatrelay_core::backends::openai::OpenAiBackend;
use chatrelay_core::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), RelayError> {
    let apps = InMemoryAppStore::from_apps([AppConfig::new("demo", "gpt-4o-mini")]);
    let relay = Relay::builder()
        .backend(Arc::new(OpenAiBackend::from_env()?))
        .app_store(Arc::new(apps))
        .build()?;

    let request = CompletionRequest::new(vec![ChatMessage::user("Say hello")]);
    let response = relay.complete("demo", &request).await?;
    println!("{}", response.content());
    Ok(())
}
