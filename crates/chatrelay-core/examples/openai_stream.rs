use std::sync::Arc;

use chatrelay_core::backends::openai::OpenAiBackend;
use chatrelay_core::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), RelayError> {
    chatrelay_core::observability::init_observability();

    let apps = InMemoryAppStore::from_apps([
        AppConfig::new("demo", "gpt-4o-mini").prompt("Reply briefly.")
    ]);
    let relay = Relay::builder()
        .backend(Arc::new(OpenAiBackend::from_env()?))
        .app_store(Arc::new(apps))
        .build()?;

    let request = CompletionRequest::new(vec![ChatMessage::user("Stream a greeting.")]);
    let mut events = relay.stream("demo", &request).await?;
    while let Some(event) = events.next_event().await {
        match event {
            StreamEvent::Content { content } => print!("{content}"),
            StreamEvent::Finished { usage, .. } => println!("\n[{} tokens]", usage.total_tokens),
            StreamEvent::Error { error } => eprintln!("run error: {error}"),
        }
    }
    Ok(())
}
