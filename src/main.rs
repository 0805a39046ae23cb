use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use rs_sort::block::{BlockHeads, BlockStore};
use rs_sort::record::RECORD_SIZE;
use rs_sort::{ExternalSorter, ExternalSorterBuilder, SortError};

/// Records listed per line by `--print`.
const RECORDS_PER_LINE: usize = 5;

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let block_size = arg_parser.value_of("block_size").expect("value is required");
    let block_size = block_size.parse::<ByteSize>().expect("value is pre-validated").as_u64() as usize;
    let heap_blocks: usize = arg_parser.value_of_t_or_exit("heap_blocks");
    let input = path::Path::new(arg_parser.value_of("input").expect("value is required"));

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_block_size(block_size)
        .with_heap_blocks(heap_blocks);

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let sorter: ExternalSorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let summary = match sorter.sort_file(input) {
        Ok(summary) => summary,
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    };

    log::info!(
        "{} records sorted (runs: {}, merge passes: {}, in memory: {})",
        summary.records,
        summary.runs,
        summary.merge_passes,
        summary.in_memory
    );

    if arg_parser.is_present("print") {
        if let Err(err) = print_block_heads(input, block_size) {
            log::error!("sorted file reading error: {}", err);
            process::exit(1);
        }
    }
}

/// Prints the first record of every block as `id key` pairs.
/// Only one record is held in memory at a time, whatever the file size.
fn print_block_heads(input: &path::Path, block_size: usize) -> Result<(), SortError> {
    let mut store = BlockStore::open(input).map_err(SortError::IO)?;
    let mut line = Vec::with_capacity(RECORDS_PER_LINE);

    for head in BlockHeads::new(&mut store, block_size).map_err(SortError::IO)? {
        let head = head?;
        line.push(format!("{} {}", head.id, head.key));
        if line.len() == RECORDS_PER_LINE {
            println!("{}", line.join(" "));
            line.clear();
        }
    }
    if !line.is_empty() {
        println!("{}", line.join(" "));
    }

    return Ok(());
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("rs-sort")
        .about("sorts a binary file of 16-byte records in place by key")
        .arg(
            clap::Arg::new("input")
                .help("file to be sorted")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::new("block_size")
                .short('b')
                .long("block-size")
                .help("file read/write block size")
                .takes_value(true)
                .default_value("8KiB")
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(size) if size.as_u64() > 0 && size.as_u64() % RECORD_SIZE as u64 == 0 => Ok(()),
                    Ok(size) => Err(format!("Block size {} is not a multiple of {} bytes", size, RECORD_SIZE)),
                    Err(err) => Err(format!("Block size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("heap_blocks")
                .short('m')
                .long("heap-blocks")
                .help("heap size in blocks, also used as merge fan-in")
                .takes_value(true)
                .default_value("8"),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("print")
                .short('p')
                .long("print")
                .help("print the first record of every block after sorting, 5 per line"),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
