use std::io;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to map shared region '{what}'")]
    Map {
        what: String,
        #[source]
        source: io::Error,
    },

    #[error("shared region of {size} bytes is too small (need at least {min})")]
    RegionTooSmall { size: usize, min: usize },

    #[error("shared region of {size} bytes is too large")]
    RegionTooLarge { size: usize },

    #[error("shared region is not aligned for its control words")]
    Misaligned,

    #[error("safety margin {margin} leaves no room in a ring of {capacity} bytes")]
    InvalidMargin { margin: u32, capacity: u32 },

    /// The peer is not draining its ring fast enough. Recoverable: the write
    /// may be retried.
    #[error("write of {len} bytes timed out after {waited:?}")]
    WriteTimeout { len: usize, waited: Duration },

    #[error("no message arrived within {waited:?}")]
    ReadTimeout { waited: Duration },

    #[error("failed to close shared region")]
    Close(#[source] io::Error),
}

impl ChannelError {
    /// Whether this is the backpressure signal rather than a transport fault.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, ChannelError::WriteTimeout { .. })
    }
}

impl From<ChannelError> for io::Error {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::WriteTimeout { .. } | ChannelError::ReadTimeout { .. } => {
                io::Error::new(io::ErrorKind::TimedOut, err)
            }
            ChannelError::Map { source, .. } | ChannelError::Close(source) => source,
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_become_timed_out_io_errors() {
        let err = ChannelError::WriteTimeout {
            len: 10,
            waited: Duration::from_secs(1),
        };
        assert!(err.is_backpressure());
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn map_errors_keep_their_os_error() {
        let err = ChannelError::Map {
            what: "/dev/mem".into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(!err.is_backpressure());
        assert_eq!(err.to_string(), "failed to map shared region '/dev/mem'");
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
    }
}
