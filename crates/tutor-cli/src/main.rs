use std::collections::HashMap;
use std::error::Error;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use tutor_core::{Attempt, DEFAULT_TOLERANCE, SubmissionOutcome, grade_submission, score};
use tutor_mesh::{Converter, QuestionDocument};

type DynError = Box<dyn Error>;
type Flags = HashMap<String, String>;

fn main() -> Result<(), DynError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    run(&args)
}

fn run(args: &[String]) -> Result<(), DynError> {
    let Some((command, rest)) = args.split_first() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "grade" => run_grade(rest),
        "score" => run_score(rest),
        "convert" => run_convert(rest),
        "export" => run_export(rest),
        other => {
            print_usage();
            Err(format!("unknown command: {other}").into())
        }
    }
}

fn run_grade(args: &[String]) -> Result<(), DynError> {
    let flags = parse_flags(args)?;
    let target = read_document(required_str(&flags, "--target")?)?;
    let user = read_document(required_str(&flags, "--user")?)?;
    let tolerance = optional(&flags, "--tolerance", DEFAULT_TOLERANCE)?;
    let attempt = Attempt {
        actions: optional(&flags, "--actions", target.expected_num_of_actions)?,
        elapsed: Duration::try_from_secs_f64(optional(
            &flags,
            "--seconds",
            target.expected_completion_time as f64,
        )?)?,
    };

    let outcome = grade_documents(&target, &user, tolerance, attempt)?;
    print!("{}", format_outcome(&target, &outcome));
    Ok(())
}

fn run_score(args: &[String]) -> Result<(), DynError> {
    let flags = parse_flags(args)?;
    let value = score(
        required(&flags, "--expected-actions")?,
        required(&flags, "--actions")?,
        required(&flags, "--expected-seconds")?,
        required(&flags, "--seconds")?,
    )?;
    println!("score {value:.5}");
    Ok(())
}

fn run_convert(args: &[String]) -> Result<(), DynError> {
    let flags = parse_flags(args)?;
    let input = required_str(&flags, "--input")?;
    let output = required_str(&flags, "--output")?;
    let report = block_on(Converter::Obj.document_to_model(Path::new(input), Path::new(output)))??;
    println!("{}", report.stdout);
    Ok(())
}

fn run_export(args: &[String]) -> Result<(), DynError> {
    let flags = parse_flags(args)?;
    let model = required_str(&flags, "--model")?;
    let output = required_str(&flags, "--output")?;
    let report = block_on(Converter::Obj.model_to_document(Path::new(model), Path::new(output)))??;
    println!("{}", report.stdout);
    Ok(())
}

fn block_on<F: std::future::Future>(future: F) -> Result<F::Output, DynError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

fn grade_documents(
    target: &QuestionDocument,
    user: &QuestionDocument,
    tolerance: f64,
    attempt: Attempt,
) -> Result<SubmissionOutcome, DynError> {
    let outcome = grade_submission(
        &target.question_name,
        &target.info().baseline(),
        &target.snapshots(),
        &user.snapshots(),
        tolerance,
        attempt,
    )?;
    Ok(outcome)
}

fn format_outcome(target: &QuestionDocument, outcome: &SubmissionOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "question {}", target.question_name);
    let _ = writeln!(out, "passed {}", outcome.passed());
    for (object, grade) in target.objects.iter().zip(&outcome.report.objects) {
        let passing = grade.verdicts.iter().filter(|verdict| verdict.is_pass()).count();
        let _ = writeln!(
            out,
            "object {} vertices {}/{} faces {}/{}",
            object.name,
            grade.matches.matched_count(),
            grade.matches.len(),
            passing,
            grade.verdicts.len()
        );
        for (face, verdict) in grade.verdicts.iter().enumerate() {
            if !verdict.is_pass() {
                let _ = writeln!(out, "  face {face} fail");
            }
        }
    }
    if outcome.passed() {
        let _ = writeln!(out, "score {:.5}", outcome.record.score);
    }
    out
}

fn read_document(path: impl AsRef<Path>) -> Result<QuestionDocument, DynError> {
    let raw = fs::read(path.as_ref())
        .map_err(|err| format!("failed to read {}: {err}", path.as_ref().display()))?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Collects `--flag value` pairs, rejecting positional words and repeated flags.
fn parse_flags(args: &[String]) -> Result<Flags, DynError> {
    let pairs = args.chunks_exact(2);
    if let [dangling] = pairs.remainder() {
        return Err(format!("flag {dangling} has no value").into());
    }

    let mut flags = Flags::new();
    for pair in pairs {
        let (flag, value) = (&pair[0], &pair[1]);
        if !flag.starts_with("--") {
            return Err(format!("expected a --flag, found '{flag}'").into());
        }
        if flags.contains_key(flag) {
            return Err(format!("{flag} given more than once").into());
        }
        flags.insert(flag.clone(), value.clone());
    }
    Ok(flags)
}

fn required_str<'a>(flags: &'a Flags, key: &str) -> Result<&'a str, DynError> {
    match flags.get(key) {
        Some(value) => Ok(value.as_str()),
        None => Err(format!("{key} is required").into()),
    }
}

fn required<T>(flags: &Flags, key: &str) -> Result<T, DynError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, required_str(flags, key)?)
}

fn optional<T>(flags: &Flags, key: &str, default: T) -> Result<T, DynError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    flags
        .get(key)
        .map_or(Ok(default), |value| parse_value(key, value))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, DynError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|err| format!("{key} '{value}': {err}").into())
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  tutor-cli grade --target <doc.json> --user <doc.json> [--tolerance <f64>] [--actions <u32>] [--seconds <f64>]"
    );
    eprintln!(
        "  tutor-cli score --expected-actions <u32> --actions <u32> --expected-seconds <f64> --seconds <f64>"
    );
    eprintln!("  tutor-cli convert --input <doc.json> --output <model.obj>");
    eprintln!("  tutor-cli export --model <model.obj> --output <doc.json>");
}
