use thiserror::Error;

/// Error type scenario providers may return from their own initialization logic.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stage configuration errors, detected when a stage is compiled into a
/// schedule — before any timer is started.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("stage \"{stage}\": invalid duration \"{value}\"")]
    InvalidDuration {
        stage: String,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    /// A non-positive rate would produce an invalid (or infinite) emission
    /// interval, so it is rejected up front.
    #[error("stage \"{stage}\": arrival rate must be a positive finite number, got {rate}")]
    InvalidRate { stage: String, rate: f64 },

    #[error("stage \"{stage}\": ramp step interval must be non-zero")]
    ZeroRampStep { stage: String },
}

/// Runtime failures that are fatal to a single stage. They surface as `Err`
/// items on the merged schedule stream; other stages keep running.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("no scenario provider registered for \"{scenario}\" (stage \"{stage}\")")]
    UnknownScenario { stage: String, scenario: String },

    #[error("scenario provider for \"{scenario}\" failed to initialize (stage \"{stage}\")")]
    ProviderInit {
        stage: String,
        scenario: String,
        #[source]
        source: BoxError,
    },
}
