use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("InternalError: {message}, {location}"))]
    Internal {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("IoError: {message}, {location}"))]
    Io {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("AddrParseError: {message}, {location}"))]
    AddrParse {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("ParseIntError: {message}, {location}"))]
    ParseInt {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("UnknownMessageKind: prefix {prefix:#04x}, {location}"))]
    UnknownMessageKind {
        prefix: u8,
        location: snafu::Location,
    },
    #[snafu(display(
        "TruncatedMessage: expected {expected} bytes, got {actual}, {location}"
    ))]
    TruncatedMessage {
        expected: usize,
        actual: usize,
        location: snafu::Location,
    },
    #[snafu(display("TransportError: {message}, {location}"))]
    Transport {
        message: String,
        location: snafu::Location,
    },
    #[snafu(display("SendError: {target}: {message}, {location}"))]
    Send {
        target: String,
        message: String,
        location: snafu::Location,
    },
}

impl Error {
    /// Returns `true` for errors raised while decoding an inbound datagram.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownMessageKind { .. } | Error::TruncatedMessage { .. }
        )
    }
}

trait SnafuLocationExt {
    fn to_snafu_location(&'static self) -> snafu::Location;
}

impl SnafuLocationExt for std::panic::Location<'static> {
    fn to_snafu_location(&'static self) -> snafu::Location {
        snafu::Location::new(self.file(), self.line(), self.column())
    }
}

macro_rules! make_error_from {
    ($from: ty, $to: ident) => {
        impl From<$from> for Error {
            #[track_caller]
            fn from(value: $from) -> Self {
                Self::$to {
                    message: value.to_string(),
                    location: std::panic::Location::caller().to_snafu_location(),
                }
            }
        }
    };
}

make_error_from!(std::io::Error, Io);
make_error_from!(std::net::AddrParseError, AddrParse);
make_error_from!(std::num::ParseIntError, ParseInt);
