type DynError = Box<dyn std::error::Error>;

/// Run a command and return `Err` on non-zero status codes.
fn run(cmd: &str, args: &[&str]) -> Result<(), DynError> {
    eprintln!("Running '{} {}'", cmd, args.join(" "));
    let status = std::process::Command::new(cmd).args(args).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("{} failed with status: {}", cmd, status))?
    }
}

fn lint() -> Result<(), DynError> {
    run("cargo", &["check", "--workspace"])?;
    run("cargo", &["clippy", "--workspace", "--", "-D", "warnings"])?;
    run("cargo", &["fmt", "--", "--check"])
}

fn format() -> Result<(), DynError> {
    run("cargo", &["fmt"])
}

fn test() -> Result<(), DynError> {
    run("cargo", &["test", "--workspace"])
}

fn main() -> Result<(), DynError> {
    let args: Vec<_> = std::env::args().skip(1).collect();
    let args_str: Vec<_> = args.iter().map(|x| x.as_str()).collect();

    match args_str.as_slice() {
        ["fmt"] => format(),
        ["lint"] => lint(),
        ["test"] => test(),
        other => Err(format!("Unknown arguments: {:?}", other))?,
    }
}
