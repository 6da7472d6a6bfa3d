#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = gradesim::run_worker().await {
        eprintln!("gradesim-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
