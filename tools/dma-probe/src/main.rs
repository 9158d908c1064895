//! Allocates DMA regions and reports where they live, virtually and physically.

use clap::Parser;
use log::{info, warn};
use memory_dma::{DmaAllocator, DmaConfig, DmaRegion, PageTranslator, parse_size};
use std::path::PathBuf;
use stderr_logger::StderrLogger;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Bytes per region, e.g. `4096`, `64k` or `2M`.
    #[arg(value_parser = byte_size)]
    size: u64,

    /// Require physically contiguous regions (at most one huge page each).
    #[arg(short, long)]
    contiguous: bool,

    /// hugetlbfs mount; defaults to the first one in /proc/mounts.
    #[arg(short, long)]
    mount: Option<PathBuf>,

    /// Backing file name prefix.
    #[arg(short, long, default_value = memory_dma::DEFAULT_PREFIX)]
    prefix: String,

    /// Allocation unit, e.g. `2M` or `1G`; defaults to the mount's page size.
    #[arg(long, value_parser = byte_size)]
    page_size: Option<u64>,

    /// Number of regions to allocate.
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Map without MAP_HUGETLB.
    #[arg(long)]
    no_hugetlb: bool,

    /// More log output; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn byte_size(value: &str) -> Result<u64, String> {
    parse_size(value).ok_or_else(|| format!("invalid size `{value}`"))
}

fn config(args: &Args) -> DmaConfig {
    let mut config = match &args.mount {
        Some(mount) => DmaConfig::default().with_mount(mount),
        None => DmaConfig::discover().unwrap_or_else(|e| {
            warn!("{e}; falling back to {}", memory_dma::DEFAULT_MOUNT);
            DmaConfig::default()
        }),
    };

    if let Some(page_size) = args.page_size {
        config = config.with_huge_page_size(page_size);
    }

    config
        .with_prefix(args.prefix.clone())
        .with_map_hugetlb(!args.no_hugetlb)
}

fn report<T: PageTranslator>(index: usize, region: &DmaRegion, translator: &T) {
    let physical = region
        .physical_base()
        .map_or_else(|| String::from("unknown"), |pa| pa.to_string());
    println!(
        "region {index}: {} bytes at {} (physical {physical})",
        region.size(),
        region.virtual_base()
    );

    let last = region.size() - 1;
    match (region.physical_at(last), region.resolve(last, translator)) {
        (Some(expected), Ok(actual)) if expected == actual => {
            println!("  last byte round-trips to {actual}");
        }
        (Some(expected), Ok(actual)) => {
            println!("  last byte expected at {expected}, resolved to {actual}");
        }
        (None, Ok(actual)) => println!("  last byte resolves to {actual}"),
        (_, Err(e)) => println!("  last byte does not resolve: {e}"),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    StderrLogger::from_verbosity(args.verbose).init()?;

    if args.page_size.is_some_and(|size| !size.is_power_of_two() || size < 4096) {
        return Err("page size must be a power of two of at least 4096 bytes".into());
    }

    let allocator = DmaAllocator::new(config(&args));
    info!("using {:?}", allocator.config());

    let mut regions = Vec::with_capacity(args.count);
    for index in 0..args.count {
        let mut region = allocator.allocate(args.size, args.contiguous)?;
        region.as_mut_slice().fill(0);
        report(index, &region, allocator.translator());
        regions.push(region);
    }

    for mut region in regions {
        region.release()?;
    }

    Ok(())
}
