use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Series shorter than the lookback a computation needs. The caller skips
    /// this cycle for the instrument.
    #[error("Insufficient data: have {have} candles, need {need}")]
    InsufficientData { have: usize, need: usize },

    /// Stop-loss / take-profit ended on the wrong side of entry after clamping.
    #[error("Insufficient stop distance on {instrument}: {reason}")]
    InsufficientDistance { instrument: String, reason: String },

    #[error("Position already open for {instrument}")]
    PositionExists { instrument: String },

    #[error("No open position for {instrument}")]
    NoOpenPosition { instrument: String },

    #[error("{collaborator} unavailable: {reason}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("Order rejected: {reason}")]
    OrderRejected { reason: String },

    #[error("Volume {volume} below minimum lot {min_lot} on {instrument}")]
    VolumeBelowMinimum {
        instrument: String,
        volume: f64,
        min_lot: f64,
    },

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Invalid price series: {0}")]
    InvalidSeries(String),

    #[error("Indicator column not computed: {0}")]
    MissingColumn(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Failures that only mean "nothing to do for this instrument this cycle".
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientData { .. }
                | Error::InsufficientDistance { .. }
                | Error::PositionExists { .. }
                | Error::VolumeBelowMinimum { .. }
        )
    }

    pub fn unavailable(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Error::CollaboratorUnavailable {
            collaborator,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
