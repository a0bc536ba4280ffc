use clap::{App, Arg, ArgMatches};
use log::info;
use mandelzoom::config::MAX_THREADS;
use mandelzoom::schedule::DEFAULT_HANDOFF_TIMEOUT;
use mandelzoom::{
    FrameNamer, FrameScheduler, HandoffPolicy, ImageSink, OutputFormat, RenderError,
    RenderRequest,
};
use num::clamp;
use std::str::FromStr;
use std::time::Duration;

fn validate_number<T: FromStr>(s: &str, err: &str) -> Result<(), String> {
    match T::from_str(s) {
        Ok(_) => Ok(()),
        Err(_) => Err(err.to_string()),
    }
}

fn validate_range<T: FromStr + Ord>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

const CENTER_X: &str = "x";
const CENTER_Y: &str = "y";
const SCALE: &str = "scale";
const WIDTH: &str = "width";
const HEIGHT: &str = "height";
const ITERATIONS: &str = "max";
const OUTPUT: &str = "output";
const FRAMES: &str = "frames";
const WORKERS: &str = "children";
const THREADS: &str = "threads";
const EXTENSION: &str = "extension";
const DIRECTORY: &str = "directory";
const POLICY: &str = "policy";
const TIMEOUT: &str = "handoff-timeout";

fn args<'a>(default_threads: &'a str, default_timeout: &'a str) -> ArgMatches<'a> {
    App::new("mandelzoom")
        .version("0.1.0")
        .about("Renders a Mandelbrot zoom as a numbered series of images")
        .arg(
            Arg::with_name(CENTER_X)
                .short("x")
                .takes_value(true)
                .allow_hyphen_values(true)
                .default_value("0")
                .validator(|s| validate_number::<f64>(&s, "Could not parse X coordinate"))
                .help("X coordinate of image center point"),
        )
        .arg(
            Arg::with_name(CENTER_Y)
                .short("y")
                .takes_value(true)
                .allow_hyphen_values(true)
                .default_value("0")
                .validator(|s| validate_number::<f64>(&s, "Could not parse Y coordinate"))
                .help("Y coordinate of image center point"),
        )
        .arg(
            Arg::with_name(SCALE)
                .short("s")
                .long(SCALE)
                .takes_value(true)
                .default_value("4")
                .validator(|s| match f64::from_str(&s) {
                    Ok(v) if v > 0.0 && v.is_finite() => Ok(()),
                    _ => Err("Scale must be a positive number".to_string()),
                })
                .help("Scale of the first frame in Mandelbrot coordinates (X-axis)"),
        )
        .arg(
            Arg::with_name(WIDTH)
                .short("W")
                .long(WIDTH)
                .takes_value(true)
                .default_value("1000")
                .validator(|s| {
                    validate_range(&s, 1, 65_535, "Could not parse width", "Width must be between 1 and 65535")
                })
                .help("Width of the image in pixels"),
        )
        .arg(
            Arg::with_name(HEIGHT)
                .short("H")
                .long(HEIGHT)
                .takes_value(true)
                .default_value("1000")
                .validator(|s| {
                    validate_range(&s, 1, 65_535, "Could not parse height", "Height must be between 1 and 65535")
                })
                .help("Height of the image in pixels"),
        )
        .arg(
            Arg::with_name(ITERATIONS)
                .short("m")
                .long(ITERATIONS)
                .takes_value(true)
                .default_value("1000")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        u32::max_value(),
                        "Could not parse iteration count",
                        "Iteration count must be at least 1",
                    )
                })
                .help("The maximum number of iterations per point"),
        )
        .arg(
            Arg::with_name(OUTPUT)
                .short("o")
                .long(OUTPUT)
                .takes_value(true)
                .default_value("mandel")
                .help("Prefix of the output file names"),
        )
        .arg(
            Arg::with_name(FRAMES)
                .short("n")
                .long(FRAMES)
                .takes_value(true)
                .default_value("50")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        u32::max_value(),
                        "Could not parse frame count",
                        "Frame count must be at least 1",
                    )
                })
                .help("Number of frames in the zoom"),
        )
        .arg(
            Arg::with_name(WORKERS)
                .short("c")
                .long(WORKERS)
                .takes_value(true)
                .default_value("1")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        1024,
                        "Could not parse worker count",
                        "Worker count must be between 1 and 1024",
                    )
                })
                .help("Number of workers the frames are divided among"),
        )
        .arg(
            Arg::with_name(THREADS)
                .short("t")
                .long(THREADS)
                .takes_value(true)
                .default_value(default_threads)
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        MAX_THREADS,
                        "Could not parse thread count",
                        &format!("Thread count must be between 1 and {}", MAX_THREADS),
                    )
                })
                .help("Number of threads each frame is divided among"),
        )
        .arg(
            Arg::with_name(EXTENSION)
                .short("e")
                .long(EXTENSION)
                .takes_value(true)
                .default_value("jpg")
                .validator(|s| {
                    OutputFormat::from_extension(&s)
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                })
                .help("Image format: jpg, png or ppm"),
        )
        .arg(
            Arg::with_name(DIRECTORY)
                .short("d")
                .long(DIRECTORY)
                .takes_value(true)
                .default_value(".")
                .help("Directory the frames are written to"),
        )
        .arg(
            Arg::with_name(POLICY)
                .long(POLICY)
                .takes_value(true)
                .possible_values(&["serial", "pipelined"])
                .default_value("pipelined")
                .help("serial: one worker busy at a time; pipelined: compute together, store in turn"),
        )
        .arg(
            Arg::with_name(TIMEOUT)
                .long(TIMEOUT)
                .takes_value(true)
                .default_value(default_timeout)
                .validator(|s| validate_number::<u64>(&s, "Could not parse timeout"))
                .help("Seconds a waiting worker tolerates no progress ahead of it; 0 waits forever"),
        )
        .after_help(
            "EXAMPLES:\n    \
             mandelzoom -x -0.5 -y -0.5 -s 0.2\n    \
             mandelzoom -x -.38 -y -.665 -s .05 -m 100\n    \
             mandelzoom -x 0.286932 -y 0.014287 -s .0005 -m 1000 -c 4 -t 8",
        )
        .get_matches()
}

fn value<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T, RenderError> {
    let raw = matches.value_of(name).unwrap_or_default();
    T::from_str(raw)
        .map_err(|_| RenderError::Configuration(format!("could not parse {} '{}'", name, raw)))
}

fn run(matches: &ArgMatches) -> Result<usize, RenderError> {
    let request = RenderRequest {
        center_x: value(matches, CENTER_X)?,
        center_y: value(matches, CENTER_Y)?,
        base_scale: value(matches, SCALE)?,
        width: value(matches, WIDTH)?,
        height: value(matches, HEIGHT)?,
        max_iterations: value(matches, ITERATIONS)?,
        frame_count: value(matches, FRAMES)?,
        worker_processes: value(matches, WORKERS)?,
        worker_threads: value(matches, THREADS)?,
    };
    request.validate()?;

    let extension = matches.value_of(EXTENSION).unwrap_or("jpg");
    OutputFormat::from_extension(extension)?;
    let namer = FrameNamer::with_extension(matches.value_of(OUTPUT).unwrap_or("mandel"), extension);
    let sink = ImageSink::new(matches.value_of(DIRECTORY).unwrap_or("."))?;
    let policy: HandoffPolicy = value(matches, POLICY)?;
    let timeout = match value::<u64>(matches, TIMEOUT)? {
        0 => None,
        seconds => Some(Duration::from_secs(seconds)),
    };

    let report = FrameScheduler::new(&request, namer, &sink)
        .policy(policy)
        .handoff_timeout(timeout)
        .run()?;
    Ok(report.frames_stored())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_module_path(false)
        .init();

    let default_threads = clamp(num_cpus::get() as u32, 1, MAX_THREADS).to_string();
    let default_timeout = DEFAULT_HANDOFF_TIMEOUT.as_secs().to_string();
    let matches = args(&default_threads, &default_timeout);

    match run(&matches) {
        Ok(frames) => info!("All {} images generated", frames),
        Err(e) => {
            eprintln!("Render failure: {}", e);
            std::process::exit(1);
        }
    }
}
