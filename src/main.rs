use travis_cargo::{cli, Error};

fn main() {
    if let Err(e) = cli::run_cli() {
        // The child already reported its own failure.
        if let Some(Error::ToolFailed { code, .. }) = e.downcast_ref::<Error>() {
            std::process::exit(*code);
        }

        eprintln!("Error: {}", e);

        // Print the error chain
        let mut source = e.source();
        while let Some(err) = source {
            eprintln!("Caused by: {}", err);
            source = err.source();
        }

        let code = e.downcast_ref::<Error>().map(Error::exit_code).unwrap_or(1);
        std::process::exit(code);
    }
}
