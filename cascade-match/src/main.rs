mod loader;

use cascade_hashing::{
    contiguous_pairs, exhaustive_pairs, CascadeHashing, Correspondence, Error, MatcherSettings,
    PairwiseMatches,
};
use loader::TextRegionLoader;
use log::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(StructOpt, Clone)]
#[structopt(
    name = "cascade-match",
    about = "Matches the features of an image collection with cascade hashing"
)]
struct Opt {
    /// The directory holding a `<stem>.feat` and a `<stem>.desc` file for every image.
    #[structopt(short, long, default_value = ".")]
    dir: PathBuf,
    /// The file where settings are specified.
    ///
    /// This is in the format of `cascade_hashing::MatcherSettings`. Defaults are used
    /// if the file doesn't exist.
    #[structopt(short, long, default_value = "cascade-settings.json")]
    settings: PathBuf,
    /// Overrides the distance ratio of the settings file.
    #[structopt(short, long)]
    ratio: Option<f32>,
    /// Overrides the number of worker threads of the settings file (0 is one per core).
    #[structopt(short, long)]
    threads: Option<usize>,
    /// Match every image with only this many following images instead of all of them.
    #[structopt(long)]
    overlap: Option<usize>,
    /// The number of values in every descriptor.
    #[structopt(long, default_value = "128")]
    dimension: usize,
    /// Output JSON file for the matches. They are written to stdout if omitted.
    #[structopt(short, long)]
    output: Option<PathBuf>,
    /// List of images, in matching order
    ///
    /// Only the file stem is used to find the feature files.
    #[structopt(parse(from_os_str))]
    images: Vec<PathBuf>,
}

/// The matches of one image pair as written out.
#[derive(Serialize)]
struct PairEntry<'a> {
    first: usize,
    second: usize,
    matches: &'a [Correspondence],
}

#[derive(Serialize)]
struct MatchesFile<'a> {
    images: &'a [String],
    pairs: Vec<PairEntry<'a>>,
}

fn main() {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();

    let settings = std::fs::File::open(&opt.settings)
        .ok()
        .and_then(|file| match serde_json::from_reader(file) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!("ignoring unreadable settings file: {}", e);
                None
            }
        });
    if settings.is_some() {
        info!("loaded existing settings");
    } else {
        info!("used default settings");
    }
    let mut settings: MatcherSettings = settings.unwrap_or_default();
    if let Some(ratio) = opt.ratio {
        settings.distance_ratio = ratio;
    }
    if let Some(threads) = opt.threads {
        settings.threads = threads;
    }

    let stems: Vec<String> = opt
        .images
        .iter()
        .map(|path| {
            path.file_stem()
                .unwrap_or(path.as_os_str())
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    let loader = TextRegionLoader::new(&opt.dir, stems, opt.dimension);
    let pairs = match opt.overlap {
        Some(overlap) => contiguous_pairs(loader.stems().len(), overlap),
        None => exhaustive_pairs(loader.stems().len()),
    };
    info!(
        "matching {} images in {} pairs",
        loader.stems().len(),
        pairs.len()
    );

    let hashing = CascadeHashing::new(settings);
    let matches = match hashing.run(&loader, 0..loader.stems().len(), &pairs) {
        Ok(matches) => matches,
        Err(Error::Load(failures)) => {
            for failure in &failures {
                error!(
                    "unable to load {}: {}",
                    loader.stems()[failure.image],
                    failure.source
                );
            }
            std::process::exit(1);
        }
        Err(e) => {
            error!("matching failed: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = write_matches(loader.stems(), &matches, opt.output.as_deref()) {
        error!("unable to write matches: {}", e);
        std::process::exit(1);
    }
}

fn write_matches(
    images: &[String],
    matches: &PairwiseMatches,
    output: Option<&Path>,
) -> std::io::Result<()> {
    let file = MatchesFile {
        images,
        pairs: matches
            .iter()
            .map(|(pair, matches)| PairEntry {
                first: pair.first(),
                second: pair.second(),
                matches,
            })
            .collect(),
    };
    match output {
        Some(path) => {
            let writer = std::io::BufWriter::new(std::fs::File::create(path)?);
            serde_json::to_writer_pretty(writer, &file)?;
            info!(
                "wrote {} matches of {} pairs to {}",
                matches.total_correspondences(),
                matches.len(),
                path.display()
            );
        }
        None => serde_json::to_writer_pretty(std::io::stdout().lock(), &file)?,
    }
    Ok(())
}
