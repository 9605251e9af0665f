use std::process::ExitCode;
use subtest_runner::cli;
use subtest_runner::core::errors;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match errors::find_fatal(&e) {
                Some(fatal) => println!("[Error (sub_test): {}]", fatal),
                None => println!("[Error (sub_test): {:#}]", e),
            }
            ExitCode::from(errors::fatal_exit_code())
        }
    }
}
