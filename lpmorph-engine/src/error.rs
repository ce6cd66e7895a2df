//! Configuration errors.
//!
//! Only configuration-time APIs return these. The per-block path absorbs bad
//! data and reports through [`Warnings`](lpmorph_core::guard::Warnings).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(f64),

    #[error("engine needs at least one channel")]
    NoChannels,

    #[error("frame length {requested} out of range [{min}, {max}]")]
    FrameLengthOutOfRange { requested: usize, min: usize, max: usize },

    #[error("prediction order {requested} out of range [1, {max}]")]
    OrderOutOfRange { requested: usize, max: usize },

    #[error("ring capacity {capacity} too small, need at least {required}")]
    CapacityTooSmall { capacity: usize, required: usize },

    #[error("channel {channel} out of range (engine has {channels})")]
    ChannelOutOfRange { channel: usize, channels: usize },

    #[error("excitation buffer is empty")]
    EmptyExcitation,

    #[error("excitation {index} out of range (bank holds {len})")]
    ExcitationIndexOutOfRange { index: usize, len: usize },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
