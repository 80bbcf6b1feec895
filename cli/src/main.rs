#[macro_use] extern crate clap;

use clap::{App, ArgMatches};
use env_logger::{Builder, Env};
use minidock::{
    errors::RuntimeError, sandbox::HelperInjection, ExitStatus, ImageReference, RegistryClient,
    Sandbox,
};
use std::{ffi::OsStr, process};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let yaml = load_yaml!("cli.yml");
    let matches = App::from_yaml(yaml)
        .version(crate_version!())
        .get_matches();

    let log_level = matches.value_of("log_level").unwrap_or("warn");
    Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let code = match matches.subcommand() {
        ("run", Some(run_matches)) => match run(run_matches).await {
            Ok(status) => status.code(),
            Err(err) => {
                log::error!("{}", err);
                exit_code(&err)
            }
        },
        (other, _) => {
            log::error!("unknown command {:?}", other);
            1
        }
    };
    // Everything with a destructor is gone by now, the sandbox root included
    process::exit(code);
}

fn exit_code(err: &RuntimeError) -> i32 {
    match err {
        RuntimeError::ChildSignaled(signal) => 128 + signal,
        _ => 1,
    }
}

async fn run(matches: &ArgMatches<'_>) -> Result<ExitStatus, RuntimeError> {
    let reference = ImageReference::parse(matches.value_of("image").unwrap_or(""))?;

    let mut client = RegistryClient::builder();
    if let Some(url) = matches.value_of("registry") {
        client = client.registry_url(url);
    }
    if let Some(url) = matches.value_of("auth_url") {
        client = client.auth_url(url);
    }
    if let Some(service) = matches.value_of("auth_service") {
        client = client.auth_service(service);
    }
    let client = client.build()?;

    let mut sandbox = Sandbox::builder();
    if let Some(helper) = matches.value_of_os("helper") {
        sandbox = sandbox.helper(helper);
    }
    if matches.is_present("no_helper") {
        sandbox = sandbox.without_helper();
    }
    if matches.is_present("link_helper") {
        sandbox = sandbox.helper_injection(HelperInjection::HardLink);
    }
    if let Some(hostname) = matches.value_of("hostname") {
        sandbox = sandbox.hostname(hostname);
    }
    let sandbox = sandbox.build();

    let mut command = matches.values_of_os("command").into_iter().flatten();
    let program: &OsStr = command.next().unwrap_or_default();
    log::info!(
        "running {:?} in {} as {}",
        program,
        reference.canonical(),
        sandbox.hostname()
    );
    sandbox.run(&client, &reference, program, command).await
}
