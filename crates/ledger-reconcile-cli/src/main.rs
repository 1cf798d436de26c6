fn main() -> anyhow::Result<()> {
    ledger_reconcile_cli::run(std::env::args())
}
