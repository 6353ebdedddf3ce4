#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = quiz_sync::run().await {
        eprintln!("quiz-sync fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
