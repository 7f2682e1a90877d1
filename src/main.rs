use foundations::cli::Cli;
use foundations::telemetry::{init_with_server, log};
use foundations::BootstrapResult;
use lg_rib::config::LgRibSettings;
use lg_rib::connection::ingest;
use lg_rib::registry::Registry;
use lg_rib::session::Translator;
use std::sync::Arc;

#[tokio::main]
async fn main() -> BootstrapResult<()> {
    let service_info = foundations::service_info!();
    let cli = Cli::<LgRibSettings>::new(&service_info, vec![])?;
    let telemetry_server = init_with_server(&service_info, &cli.settings.telemetry, vec![])?;

    let registry = Arc::new(Registry::new());
    let translator = Translator::new(registry.clone(), cli.settings.ingest.clone());

    // The feed arrives on stdin and is consumed by this task alone.
    let feed = ingest(tokio::io::stdin(), &translator);
    tokio::pin!(feed);
    let summary = tokio::select! {
        res = &mut feed => res?,
        _ = telemetry_server => (&mut feed).await?,
    };

    log::info!("Ingestion finished";
        "lines" => summary.lines,
        "dropped" => summary.dropped,
        "shutdown" => summary.shutdown
    );
    for neighbor in registry.neighbors() {
        let n = neighbor.snapshot();
        log::info!("Neighbor summary";
            "neighbor" => %n.ip,
            "state" => %n.state,
            "updates" => n.updates,
            "prefixes" => n.prefixes,
            "asns" => n.asns
        );
    }

    Ok(())
}
