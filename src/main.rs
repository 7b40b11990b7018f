use std::env;
use std::process::ExitCode;

use tar_stream::{list, pack, unpack_with, Options};

fn main() -> ExitCode {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let verbose = match args.iter().position(|a| a == "-v") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };

    let default_filter = if verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let Some(command) = args.first() else {
        print_usage();
        return ExitCode::FAILURE;
    };

    let result = match command.as_str() {
        "pack" => {
            if args.len() < 3 {
                eprintln!("Error: pack requires at least tarfile and one input file");
                print_usage();
                return ExitCode::FAILURE;
            }
            pack(&args[1], &args[2..])
        }
        "unpack" => {
            if args.len() < 3 {
                eprintln!("Error: unpack requires tarfile and output directory");
                print_usage();
                return ExitCode::FAILURE;
            }
            unpack_with(&args[1], &args[2], Options::default().verbose(verbose))
        }
        "list" => {
            if args.len() < 2 {
                eprintln!("Error: list requires tarfile");
                print_usage();
                return ExitCode::FAILURE;
            }
            list(&args[1]).map(|entries| {
                for entry in &entries {
                    if verbose {
                        println!("{}", entry.long_listing());
                    } else {
                        println!("{}", entry.name);
                    }
                }
            })
        }
        _ => {
            eprintln!("Error: Unknown command '{}'", command);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  pack <tarfile> <path>...       - Create tar archive (.tar, .tar.gz, .tar.bz2)");
    eprintln!("  unpack <tarfile> <directory>   - Extract tar archive");
    eprintln!("  list <tarfile>                 - List entries in tar archive");
    eprintln!("Options:");
    eprintln!("  -v                             - Verbose output");
}
