fn main() -> anyhow::Result<()> {
    log_metrics::run()
}
