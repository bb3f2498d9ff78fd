use std::error::Error;
use std::path::Path;

use crate::core::access::ServiceProvider;
use crate::core::platform::{ApiContext, ClientApi, SpeechOptions};

pub async fn run_speak(
    ctx: ApiContext,
    text: Vec<String>,
    output: &Path,
    voice: String,
    model: String,
) -> Result<(), Box<dyn Error>> {
    let input = text.join(" ");
    let client = ClientApi::new(ServiceProvider::OpenAI, ctx);
    let audio = client
        .llm()
        .speech(SpeechOptions {
            model,
            input,
            voice,
            ..Default::default()
        })
        .await?;
    std::fs::write(output, &audio)?;
    println!("✅ Wrote {} bytes of audio to {}", audio.len(), output.display());
    Ok(())
}
