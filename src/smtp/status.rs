use core::fmt::{self, Display, Formatter};

/// Reply codes spoken by the transient SMTP server.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    ServiceReady,
    GoodBye,
    Ok,
    Unavailable,
    SyntaxError,
    ParameterSyntaxError,
    NotImplemented,
    Unknown(u16),
}

impl Status {
    /// Checks if the status is a positive completion reply
    pub fn is_success(self) -> bool {
        (200..300).contains(&u16::from(self))
    }

    /// Checks if the status is a permanent rejection
    pub fn is_permanent(self) -> bool {
        u16::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection
    pub fn is_temporary(self) -> bool {
        (400..500).contains(&u16::from(self))
    }
}

impl From<u16> for Status {
    fn from(value: u16) -> Self {
        match value {
            220 => Self::ServiceReady,
            221 => Self::GoodBye,
            250 => Self::Ok,
            421 => Self::Unavailable,
            500 => Self::SyntaxError,
            501 => Self::ParameterSyntaxError,
            502 => Self::NotImplemented,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Status> for u16 {
    fn from(value: Status) -> Self {
        match value {
            Status::ServiceReady => 220,
            Status::GoodBye => 221,
            Status::Ok => 250,
            Status::Unavailable => 421,
            Status::SyntaxError => 500,
            Status::ParameterSyntaxError => 501,
            Status::NotImplemented => 502,
            Status::Unknown(v) => v,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u16::from(*self))
    }
}
