use school_attendance::attendance::MAX_TREND_DAYS;
use school_attendance::consent::LinkRequestId;
use school_attendance::{Direction, StudentId, UserId};
use std::fmt;

/// Default number of days covered by `stats`
pub const DEFAULT_STATS_DAYS: u32 = 7;

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Manual capture, optionally annotated
    Record {
        student_id: StudentId,
        direction: Direction,
        notes: Option<String>,
    },
    OtcGenerate {
        student_id: StudentId,
    },
    OtcSubmit {
        code: String,
        direction: Direction,
    },
    QrGenerate {
        student_id: StudentId,
    },
    QrScan {
        payload: String,
        direction: Direction,
    },
    QrRevoke {
        student_id: StudentId,
    },
    ConsentCreate {
        student_id: StudentId,
        new_guardian_id: UserId,
    },
    ConsentShow {
        request_id: LinkRequestId,
    },
    Consent {
        action: ConsentVerb,
        request_id: LinkRequestId,
        actor_id: UserId,
    },
    Stats {
        student_id: StudentId,
        days: u32,
    },
}

/// Transition requested on a guardian link request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentVerb {
    Approve,
    Reject,
    Finalize,
}

/// Errors that can occur during command parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Argument is not a valid number.
    InvalidNumber { field: &'static str, value: String },
    /// Direction is neither `in` nor `out`.
    InvalidDirection(String),
    /// Required argument missing; carries the usage line.
    MissingArgument(&'static str),
    /// Unrecognized command.
    UnrecognizedCommand(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNumber { field, value } => {
                write!(f, "Invalid {} '{}'. Must be a positive number in range", field, value)
            }
            Self::InvalidDirection(value) => {
                write!(f, "Invalid direction '{}'. Use 'in' or 'out'", value)
            }
            Self::MissingArgument(usage) => write!(f, "Missing argument. Usage: {}", usage),
            Self::UnrecognizedCommand(cmd) => write!(
                f,
                "Unrecognized command '{}'. Use --help to see available commands",
                cmd
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse a command string into a Command.
///
/// # Arguments
///
/// * `input` - The raw command string
///
/// # Returns
///
/// * `Ok(Command)` - Successfully parsed command
/// * `Err(ParseError)` - Parse error with descriptive message
///
/// # Examples
///
/// ```
/// use sa_client::commands::{Command, parse_command};
/// use school_attendance::Direction;
///
/// assert!(matches!(
///     parse_command("checkin 42"),
///     Ok(Command::Record { student_id: 42, direction: Direction::CheckIn, notes: None })
/// ));
/// assert!(matches!(parse_command("qr revoke 42"), Ok(Command::QrRevoke { student_id: 42 })));
/// ```
pub fn parse_command(input: &str) -> Result<Command, ParseError> {
    let trimmed = input.trim();
    let parts: Vec<&str> = trimmed.split_ascii_whitespace().collect();

    match parts.first() {
        Some(&"checkin") => parse_record(&parts, Direction::CheckIn),
        Some(&"checkout") => parse_record(&parts, Direction::CheckOut),
        Some(&"otc") => parse_otc_command(&parts),
        Some(&"qr") => parse_qr_command(&parts),
        Some(&"consent") => parse_consent_command(&parts),
        Some(&"stats") => parse_stats_command(&parts),
        _ => Err(ParseError::UnrecognizedCommand(trimmed.to_string())),
    }
}

/// Parse a manual capture: "checkin|checkout STUDENT [NOTES...]"
fn parse_record(parts: &[&str], direction: Direction) -> Result<Command, ParseError> {
    const USAGE: &str = "checkin|checkout STUDENT [NOTES]";
    let student_id = number(parts.get(1), "student id", USAGE)?;
    let notes = (parts.len() > 2).then(|| parts[2..].join(" "));
    Ok(Command::Record {
        student_id,
        direction,
        notes,
    })
}

/// Parse "otc generate STUDENT" or "otc submit CODE in|out"
fn parse_otc_command(parts: &[&str]) -> Result<Command, ParseError> {
    const USAGE: &str = "otc generate STUDENT | otc submit CODE in|out";
    match parts.get(1) {
        Some(&"generate") => Ok(Command::OtcGenerate {
            student_id: number(parts.get(2), "student id", USAGE)?,
        }),
        Some(&"submit") => {
            let code = parts.get(2).ok_or(ParseError::MissingArgument(USAGE))?;
            Ok(Command::OtcSubmit {
                code: (*code).to_string(),
                direction: direction(parts.get(3), USAGE)?,
            })
        }
        _ => Err(ParseError::MissingArgument(USAGE)),
    }
}

/// Parse "qr generate STUDENT", "qr scan PAYLOAD in|out" or "qr revoke STUDENT"
fn parse_qr_command(parts: &[&str]) -> Result<Command, ParseError> {
    const USAGE: &str = "qr generate STUDENT | qr scan PAYLOAD in|out | qr revoke STUDENT";
    match parts.get(1) {
        Some(&"generate") => Ok(Command::QrGenerate {
            student_id: number(parts.get(2), "student id", USAGE)?,
        }),
        Some(&"scan") => {
            let payload = parts.get(2).ok_or(ParseError::MissingArgument(USAGE))?;
            Ok(Command::QrScan {
                payload: (*payload).to_string(),
                direction: direction(parts.get(3), USAGE)?,
            })
        }
        Some(&"revoke") => Ok(Command::QrRevoke {
            student_id: number(parts.get(2), "student id", USAGE)?,
        }),
        _ => Err(ParseError::MissingArgument(USAGE)),
    }
}

/// Parse "consent create STUDENT GUARDIAN", "consent show ID" or
/// "consent approve|reject|finalize ID ACTOR"
fn parse_consent_command(parts: &[&str]) -> Result<Command, ParseError> {
    const USAGE: &str =
        "consent create STUDENT GUARDIAN | consent show ID | consent approve|reject|finalize ID ACTOR";
    let action = match parts.get(1) {
        Some(&"create") => {
            return Ok(Command::ConsentCreate {
                student_id: number(parts.get(2), "student id", USAGE)?,
                new_guardian_id: number(parts.get(3), "guardian id", USAGE)?,
            });
        }
        Some(&"show") => {
            return Ok(Command::ConsentShow {
                request_id: number(parts.get(2), "request id", USAGE)?,
            });
        }
        Some(&"approve") => ConsentVerb::Approve,
        Some(&"reject") => ConsentVerb::Reject,
        Some(&"finalize") => ConsentVerb::Finalize,
        _ => return Err(ParseError::MissingArgument(USAGE)),
    };

    Ok(Command::Consent {
        action,
        request_id: number(parts.get(2), "request id", USAGE)?,
        actor_id: number(parts.get(3), "actor id", USAGE)?,
    })
}

/// Parse "stats STUDENT [DAYS]"
fn parse_stats_command(parts: &[&str]) -> Result<Command, ParseError> {
    const USAGE: &str = "stats STUDENT [DAYS]";
    let student_id = number(parts.get(1), "student id", USAGE)?;
    let days = match parts.get(2) {
        Some(value) => value
            .parse::<u32>()
            .ok()
            .filter(|d| (1..=MAX_TREND_DAYS).contains(d))
            .ok_or_else(|| ParseError::InvalidNumber {
                field: "day count",
                value: (*value).to_string(),
            })?,
        None => DEFAULT_STATS_DAYS,
    };
    Ok(Command::Stats { student_id, days })
}

fn number(value: Option<&&str>, field: &'static str, usage: &'static str) -> Result<i64, ParseError> {
    let value = value.ok_or(ParseError::MissingArgument(usage))?;
    value
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ParseError::InvalidNumber {
            field,
            value: (*value).to_string(),
        })
}

fn direction(value: Option<&&str>, usage: &'static str) -> Result<Direction, ParseError> {
    match value {
        Some(&"in") => Ok(Direction::CheckIn),
        Some(&"out") => Ok(Direction::CheckOut),
        Some(other) => Err(ParseError::InvalidDirection((*other).to_string())),
        None => Err(ParseError::MissingArgument(usage)),
    }
}
