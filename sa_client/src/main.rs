//! Command-line client for the school attendance core.
//!
//! Runs one command (or a `;`-separated sequence) against the attendance
//! server, or against an in-process backend with `--offline`, and prints
//! each result as JSON.

use anyhow::{Context, Result, anyhow, bail};
use pico_args::Arguments;
use sa_client::commands::{Command, ConsentVerb, parse_command};
use sa_client::http::{DEFAULT_SERVER_URL, HttpBackend};
use school_attendance::biometric::UnavailablePlatform;
use school_attendance::qr::QrOptions;
use school_attendance::{
    CoreConfig, ErrorKind, InMemoryBackend, MemoryStore, SchoolBackend, SchoolServices,
    StudentId, SystemClock, UserId,
};
use serde::Serialize;
use std::sync::Arc;

const HELP: &str = "\
Record school attendance and manage guardian links

USAGE:
  sa_client [OPTIONS] COMMAND [; COMMAND ...]

OPTIONS:
  --server URL              Server URL  [env: SA_SERVER_URL, default: http://localhost:8080]
  --token TOKEN             Bearer token  [env: SA_ACCESS_TOKEN]
  --offline                 Use an in-process backend instead of the server
  --guardian STUDENT=USER   Seed a guardian link (offline only, repeatable)
  --teacher STUDENT=USER    Seed a class teacher (offline only, repeatable)

COMMANDS:
  checkin|checkout STUDENT [NOTES]
  otc generate STUDENT
  otc submit CODE in|out
  qr generate STUDENT
  qr scan PAYLOAD in|out
  qr revoke STUDENT
  consent create STUDENT GUARDIAN
  consent show ID
  consent approve|reject|finalize ID ACTOR
  stats STUDENT [DAYS]

FLAGS:
  -h, --help                Print help information
";

struct Args {
    server_url: String,
    token: Option<String>,
    offline: bool,
    guardians: Vec<(StudentId, UserId)>,
    teachers: Vec<(StudentId, UserId)>,
    commands: Vec<Command>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before the logger so RUST_LOG can come from it
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut pargs = Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = parse_args(pargs)?;
    let config = CoreConfig::from_env().context("Failed to load attendance configuration")?;

    if args.offline {
        let clock = Arc::new(SystemClock);
        let mut backend = InMemoryBackend::from_config(clock, &config);
        for (student_id, guardian_id) in &args.guardians {
            backend = backend.with_guardians(*student_id, &[*guardian_id]);
        }
        for (student_id, teacher_id) in &args.teachers {
            backend = backend.with_teacher(*student_id, *teacher_id);
        }
        log::info!("Running {} command(s) offline", args.commands.len());
        execute(config, Arc::new(backend), &args.commands).await
    } else {
        let mut backend = HttpBackend::new(args.server_url);
        if let Some(token) = args.token {
            backend = backend.with_token(token);
        }
        log::info!(
            "Running {} command(s) against {}",
            args.commands.len(),
            backend.base_url()
        );
        execute(config, Arc::new(backend), &args.commands).await
    }
}

fn parse_args(mut pargs: Arguments) -> Result<Args> {
    let server_url = match pargs.opt_value_from_str::<_, String>("--server")? {
        Some(url) => url,
        None => std::env::var("SA_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string()),
    };
    let token = match pargs.opt_value_from_str::<_, String>("--token")? {
        Some(token) => Some(token),
        None => std::env::var("SA_ACCESS_TOKEN").ok(),
    };
    let offline = pargs.contains("--offline");
    let guardians = pargs
        .values_from_fn("--guardian", parse_pair)
        .context("Invalid --guardian value")?;
    let teachers = pargs
        .values_from_fn("--teacher", parse_pair)
        .context("Invalid --teacher value")?;

    let words: Vec<String> = pargs
        .finish()
        .into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let line = words.join(" ");

    let commands = line
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| parse_command(part).map_err(|e| anyhow!(e)))
        .collect::<Result<Vec<_>>>()?;
    if commands.is_empty() {
        bail!("No command given. Use --help to see available commands");
    }

    Ok(Args {
        server_url,
        token,
        offline,
        guardians,
        teachers,
        commands,
    })
}

/// Parse `STUDENT=USER`
fn parse_pair(value: &str) -> Result<(StudentId, UserId), String> {
    let (student, user) = value
        .split_once('=')
        .ok_or_else(|| format!("expected STUDENT=USER, got '{}'", value))?;
    let student = student
        .trim()
        .parse()
        .map_err(|_| format!("invalid student id '{}'", student))?;
    let user = user
        .trim()
        .parse()
        .map_err(|_| format!("invalid user id '{}'", user))?;
    Ok((student, user))
}

async fn execute<B>(config: CoreConfig, backend: Arc<B>, commands: &[Command]) -> Result<()>
where
    B: SchoolBackend + 'static,
{
    let services = SchoolServices::new(
        config,
        backend,
        Arc::new(MemoryStore::new()),
        Arc::new(SystemClock),
        Arc::new(UnavailablePlatform),
    )
    .context("Invalid attendance configuration")?;

    for command in commands {
        run_command(&services, command).await?;
    }
    Ok(())
}

async fn run_command(services: &SchoolServices, command: &Command) -> Result<()> {
    match command {
        Command::Record {
            student_id,
            direction,
            notes,
        } => print(report(
            services
                .record_manual(*student_id, *direction, notes.clone())
                .await,
        )?),
        Command::OtcGenerate { student_id } => {
            print(report(services.otc().generate(*student_id, None, None).await)?)
        }
        Command::OtcSubmit { code, direction } => {
            print(report(services.otc().submit(code, *direction).await)?)
        }
        Command::QrGenerate { student_id } => print(report(
            services
                .qr()
                .generate(*student_id, QrOptions::default())
                .await,
        )?),
        Command::QrScan { payload, direction } => {
            print(report(services.qr().scan(payload, *direction).await)?)
        }
        Command::QrRevoke { student_id } => {
            report(services.qr().revoke(*student_id).await)?;
            println!("Revoked QR token of student {}", student_id);
            Ok(())
        }
        Command::ConsentCreate {
            student_id,
            new_guardian_id,
        } => print(report(
            services.consent().create(*student_id, *new_guardian_id).await,
        )?),
        Command::ConsentShow { request_id } => {
            print(report(services.consent().get(*request_id).await)?)
        }
        Command::Consent {
            action,
            request_id,
            actor_id,
        } => {
            let consent = services.consent();
            let result = match action {
                ConsentVerb::Approve => consent.approve(*request_id, *actor_id).await,
                ConsentVerb::Reject => consent.reject(*request_id, *actor_id).await,
                ConsentVerb::Finalize => consent.finalize(*request_id, *actor_id).await,
            };
            print(report(result)?)
        }
        Command::Stats { student_id, days } => {
            print(report(services.dashboard(*student_id, *days).await)?)
        }
    }
}

fn print<T: Serialize>(value: T) -> Result<()> {
    let json = serde_json::to_string_pretty(&value).context("Failed to encode result")?;
    println!("{}", json);
    Ok(())
}

/// Error surface shared by every core error type
trait ClientFacing: std::error::Error + Send + Sync + 'static {
    fn kind(&self) -> ErrorKind;
    fn client_message(&self) -> String;
}

macro_rules! client_facing {
    ($($ty:ty),* $(,)?) => {
        $(impl ClientFacing for $ty {
            fn kind(&self) -> ErrorKind {
                <$ty>::kind(self)
            }

            fn client_message(&self) -> String {
                <$ty>::client_message(self)
            }
        })*
    };
}

client_facing!(
    school_attendance::AttendanceError,
    school_attendance::otc::OtcError,
    school_attendance::qr::QrError,
    school_attendance::consent::ConsentError,
);

/// Turn a core error into a printable one, keeping the full chain in the log
fn report<T, E: ClientFacing>(result: Result<T, E>) -> Result<T> {
    result.map_err(|err| {
        log::debug!("Command failed: {:?}", err);
        let kind = err.kind();
        let message = err.client_message();
        let retry = if kind.is_retryable() { ", retryable" } else { "" };
        anyhow!(err).context(format!("{} [{}{}]", message, kind, retry))
    })
}
