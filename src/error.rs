use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub code: ErrorCode,
    pub subcode: ErrorSubCode,
    pub data: Option<String>,
}

impl Error {
    pub fn new(code: ErrorCode, subcode: ErrorSubCode, data: Option<String>) -> Error {
        Error {
            code,
            subcode,
            data,
        }
    }

    pub fn new_local(subcode: LocalLogicErrorSubcode, data: Option<String>) -> Error {
        Error::new(ErrorCode::LocalLogicError, subcode.into(), data)
    }

    pub fn new_input(subcode: InputErrorSubcode, data: Option<String>) -> Error {
        Error::new(ErrorCode::InputError, subcode.into(), data)
    }

    pub fn err_input<T>(subcode: InputErrorSubcode, data: Option<String>) -> Result<T> {
        Err(Self::new_input(subcode, data))
    }

    pub fn is_malformed_prefix(&self) -> bool {
        self.subcode == ErrorSubCode::from(InputErrorSubcode::MalformedPrefix)
    }

    pub fn is_line_too_long(&self) -> bool {
        self.subcode == ErrorSubCode::from(InputErrorSubcode::LineTooLong)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.code, self.subcode)?;
        if let Some(data) = &self.data {
            write!(f, ": {data}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::new_local(LocalLogicErrorSubcode::IOError, Some(e.to_string()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::new_input(InputErrorSubcode::UndecodableLine, Some(e.to_string()))
    }
}

impl From<tokio_util::codec::AnyDelimiterCodecError> for Error {
    fn from(e: tokio_util::codec::AnyDelimiterCodecError) -> Self {
        match e {
            tokio_util::codec::AnyDelimiterCodecError::MaxChunkLengthExceeded => {
                Error::new_input(InputErrorSubcode::LineTooLong, None)
            }
            tokio_util::codec::AnyDelimiterCodecError::Io(e) => e.into(),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum LocalLogicErrorSubcode {
    IOError = 1,
}

#[derive(Debug, PartialEq)]
pub enum InputErrorSubcode {
    UndecodableLine = 1,
    MalformedPrefix = 2,
    LineTooLong = 3,
}

#[derive(Debug, PartialEq)]
pub enum ErrorSubCode {
    LocalLogicErrorSubcode(LocalLogicErrorSubcode),
    InputErrorSubcode(InputErrorSubcode),
}

impl From<LocalLogicErrorSubcode> for ErrorSubCode {
    fn from(subcode: LocalLogicErrorSubcode) -> Self {
        ErrorSubCode::LocalLogicErrorSubcode(subcode)
    }
}

impl From<InputErrorSubcode> for ErrorSubCode {
    fn from(subcode: InputErrorSubcode) -> Self {
        ErrorSubCode::InputErrorSubcode(subcode)
    }
}

#[derive(Debug, PartialEq)]
pub enum ErrorCode {
    LocalLogicError = 0,
    InputError = 1,
}
