use anyhow::Result;
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Clone)]
#[command(
    name = "s3cp",
    version,
    about = "Upload files to S3 with a bounded transfer rate",
    long_about = "`s3cp` uploads a local file, or every regular file below a directory, to an S3 bucket.

All bytes of an invocation pass through a single token-bucket limiter (--max), uploads run one
at a time and the first failure stops the whole run.

EXAMPLES:
    # Upload a single file, keeping its name
    s3cp --bucket my-bucket --profile work ./report.csv reports/

    # Upload a directory tree at most 2 MiB/s
    s3cp -b my-bucket -r --max 2m /var/log/app backup/ --progress --summary

Credentials come from --access-key/--secret-key (AWS_ACCESS_KEY/AWS_SECRET_KEY) or, if the key
pair is not given, from the named --profile."
)]
struct Args {
    // Destination
    /// Destination bucket
    #[arg(
        short = 'b',
        long,
        env = "S3_BUCKET_NAME",
        default_value = "",
        hide_default_value = true,
        value_name = "BUCKET",
        help_heading = "Destination"
    )]
    bucket: String,

    /// Region of the bucket
    #[arg(
        long,
        env = "S3_REGION_NAME",
        default_value = "ap-northeast-1",
        value_name = "REGION",
        help_heading = "Destination"
    )]
    region: String,

    // Credentials
    /// Access key, used together with --secret-key
    #[arg(
        long,
        alias = "access_key",
        env = "AWS_ACCESS_KEY",
        hide_env_values = true,
        value_name = "KEY",
        help_heading = "Credentials"
    )]
    access_key: Option<String>,

    /// Secret key, used together with --access-key
    #[arg(
        long,
        alias = "secret_key",
        env = "AWS_SECRET_KEY",
        hide_env_values = true,
        value_name = "KEY",
        help_heading = "Credentials"
    )]
    secret_key: Option<String>,

    /// Named profile from the shared AWS config, used when no key pair is given
    #[arg(short = 'p', long, value_name = "NAME", help_heading = "Credentials")]
    profile: Option<String>,

    // Transfer options
    /// Upload the contents of SRC recursively, keys are DST joined with the relative path
    #[arg(short = 'r', long, help_heading = "Transfer options")]
    recursive: bool,

    /// Maximum transfer rate in bytes per second
    ///
    /// Accepts a plain integer or an integer followed by k/K (KiB/s) or m/M (MiB/s), e.g.
    /// "512", "100k", "2M". Defaults to 1 GiB/s.
    #[arg(
        long,
        value_name = "RATE",
        value_parser = throttle::parse_rate,
        default_value = "",
        hide_default_value = true,
        help_heading = "Transfer options"
    )]
    max: u64,

    // Progress & output
    /// Show progress
    #[arg(long, help_heading = "Progress & output")]
    progress: bool,

    /// Toggles the type of progress to show
    ///
    /// If specified, --progress flag is implied.
    ///
    /// Options are: `ProgressBar` (animated progress bar), `TextUpdates` (appropriate for logging), Auto (default, will
    /// choose between `ProgressBar` or `TextUpdates` depending on the type of terminal attached to stderr)
    #[arg(long, value_name = "TYPE", help_heading = "Progress & output")]
    progress_type: Option<common::ProgressType>,

    /// Sets the delay between progress updates
    ///
    /// - For the interactive (--progress-type=ProgressBar), the default is 200ms.
    /// - For the non-interactive (--progress-type=TextUpdates), the default is 10s.
    ///
    /// If specified, --progress flag is implied.
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "10s", "5min" etc.
    #[arg(long, value_name = "DELAY", help_heading = "Progress & output")]
    progress_delay: Option<String>,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// Local file, or directory with --recursive
    #[arg()]
    src: std::path::PathBuf,

    /// Destination key; with --recursive a key prefix, a trailing '/' keeps the source file name
    #[arg()]
    dst: String,
}

#[instrument(skip_all)]
async fn async_main(args: Args) -> Result<common::Summary> {
    let credentials = common::credentials::resolve(&common::credentials::CredentialInputs {
        access_key: args.access_key.as_deref(),
        secret_key: args.secret_key.as_deref(),
        profile: args.profile.as_deref(),
    })
    .map_err(common::Error::from)?;
    let config = common::TransferConfig {
        bucket: args.bucket,
        region: args.region,
        credentials,
        max_rate: args.max,
        burst: throttle::DEFAULT_BURST,
    };
    config.validate().map_err(common::Error::Configuration)?;
    tracing::debug!(
        "uploading {:?} to {}/{} (recursive: {}, rate: {} B/s)",
        &args.src,
        &config.bucket,
        &args.dst,
        args.recursive,
        config.max_rate
    );
    let store = common::store::S3Store::connect(&config.region, &config.credentials).await;
    let summary = if args.recursive {
        common::upload_tree(&store, &config, &args.src, &args.dst).await?
    } else {
        common::upload_single(&store, &config, &args.src, &args.dst).await?
    };
    Ok(summary)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let res = common::run(
        if args.progress || args.progress_type.is_some() || args.progress_delay.is_some() {
            Some(common::ProgressSettings {
                progress_type: args.progress_type.unwrap_or_default(),
                progress_delay: args.progress_delay,
            })
        } else {
            None
        },
        output,
        runtime,
        func,
    );
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
