use foundations::settings::settings;
use foundations::telemetry::settings::TelemetrySettings;

// ExaBGP style feeds: one progress line per neighbor every this many updates.
pub const DFLT_PROGRESS_INTERVAL: u64 = 25_000;

pub const DFLT_MAX_LINE_LENGTH: usize = 1 << 20;

#[settings]
pub struct LgRibSettings {
    /// Telemetry settings.
    pub telemetry: TelemetrySettings,
    /// Feed ingestion settings.
    pub ingest: IngestSettings,
}

#[settings(impl_default = false)]
pub struct IngestSettings {
    /// Log a progress line for a neighbor every this many prefix updates.
    /// Zero disables progress logging.
    pub progress_interval: u64,
    /// Stop ingesting when an update carries a prefix that does not parse.
    /// When false the offending line is logged and skipped.
    pub abort_on_malformed_prefix: bool,
    /// Lines longer than this many bytes are discarded.
    pub max_line_length: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        IngestSettings {
            progress_interval: DFLT_PROGRESS_INTERVAL,
            abort_on_malformed_prefix: false,
            max_line_length: DFLT_MAX_LINE_LENGTH,
        }
    }
}
