#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
extern crate loggerv;
extern crate libc;

extern crate extcat;

use extcat::*;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use std::process;

fn print_error_debug(e: &Error) {
    // unwind the error chain
    for e in e.iter().skip(1) {
        warn!("caused by: {}", e);
    }
}

fn main() {
    let app = App::new("extcat")
        .version(crate_version!())
        .setting(AppSettings::VersionlessSubcommands)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::ColoredHelp)
        .setting(AppSettings::DeriveDisplayOrder)
        .global_settings(&[AppSettings::ColoredHelp])
        .about("Deploy client extensions right meow")
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .help("Increase verbosity"))
        .arg(Arg::with_name("debug")
            .short("d")
            .long("debug")
            .help("Adds line numbers to log statements"))
        .subcommand(SubCommand::with_name("run")
            .about("Run the operator against the cluster and the input tree"))
        .subcommand(SubCommand::with_name("scan")
            .about("Perform a single scan pass over the input tree, then exit"))
        .subcommand(SubCommand::with_name("crd")
            .about("Print the LiferayExtension custom resource definition"));

    // arg parse
    let args = app.get_matches();
    let name = args.subcommand_name().unwrap();
    let _ = run(&args).map_err(|e| {
        error!("{} error: {}", name, e);
        print_error_debug(&e);
        process::exit(1);
    });
    process::exit(0);
}

fn run(args: &ArgMatches) -> Result<()> {
    // initialise deps and set log default - always show INFO messages (+1)
    loggerv::Logger::new()
        .verbosity(args.occurrences_of("verbose") + 1)
        .module_path(true)
        .line_numbers(args.is_present("debug"))
        .init()
        .unwrap();

    // Ignore SIGPIPE errors to avoid having to use let _ = write! everywhere
    // See https://github.com/rust-lang/rust/issues/46016
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    if args.subcommand_matches("crd").is_some() {
        println!("{}", serde_yaml::to_string(&LiferayExtension::crd())?);
        return Ok(());
    }

    let cfg = OperatorConfig::from_env()?;
    let mut rt = tokio::runtime::Runtime::new()?;

    if args.subcommand_matches("run").is_some() {
        return rt.block_on(operator::run(cfg));
    }
    if args.subcommand_matches("scan").is_some() {
        let upserts = rt.block_on(operator::scan(cfg))?;
        info!("Scan pass complete, {} upserts attempted", upserts);
        return Ok(());
    }
    unreachable!("Subcommand required")
}
