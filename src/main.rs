#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = gradesim::run().await {
        eprintln!("gradesim fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
