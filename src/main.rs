#[tokio::main]
async fn main() {
    if let Err(e) = story_narrator_lib::run().await {
        tracing::error!("Story Narrator failed: {:#}", e);
        std::process::exit(1);
    }
}
