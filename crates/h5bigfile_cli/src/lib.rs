//! `h5bigfile_cli` v1:
//! Argument model and driver for the `h5tobigfile` binary.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use h5bigfile_io_h5::{
    EnumConvertPatternMode, ReportConvert, SourceNode, SpecConvertOptions, copy_tree,
};

/// Pattern mode as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EnumCliPatternMode {
    #[default]
    Glob,
    Regex,
    Literal,
}

impl From<EnumCliPatternMode> for EnumConvertPatternMode {
    fn from(value: EnumCliPatternMode) -> Self {
        match value {
            EnumCliPatternMode::Glob => EnumConvertPatternMode::Glob,
            EnumCliPatternMode::Regex => EnumConvertPatternMode::Regex,
            EnumCliPatternMode::Literal => EnumConvertPatternMode::Literal,
        }
    }
}

/// Copy every dataset of an HDF5 file into a BigFile.
#[derive(Parser, Debug)]
#[command(name = "h5tobigfile", version, about, long_about = None)]
pub struct Args {
    /// Source HDF5 file.
    pub hdf5: PathBuf,
    /// Destination BigFile directory.
    pub bigfile: PathBuf,
    /// Re-open the destination and compare every block with its source dataset.
    #[arg(long, default_value_t = false)]
    pub verify: bool,
    /// Only convert datasets whose destination path matches (repeatable).
    #[arg(long = "include")]
    pub patterns_include: Vec<String>,
    /// Skip datasets whose destination path matches (repeatable).
    #[arg(long = "exclude")]
    pub patterns_exclude: Vec<String>,
    #[arg(long, value_enum, default_value_t)]
    pub pattern_mode: EnumCliPatternMode,
    /// Split each block into blob files of at most this many bytes.
    #[arg(long)]
    pub bytes_per_file: Option<u64>,
    /// Log and count without writing anything.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn to_options(&self) -> SpecConvertOptions {
        let to_patterns = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());
        SpecConvertOptions {
            patterns_include: to_patterns(&self.patterns_include),
            patterns_exclude: to_patterns(&self.patterns_exclude),
            rule_pattern: self.pattern_mode.into(),
            bytes_per_file: self.bytes_per_file,
            if_verify: self.verify,
            if_dry_run: self.dry_run,
        }
    }
}

/// Convert an already opened source tree into `args.bigfile`.
pub fn convert_source(source_root: &SourceNode, args: &Args) -> anyhow::Result<ReportConvert> {
    copy_tree(source_root, &args.bigfile, args.to_options()).with_context(|| {
        format!(
            "Failed to convert {} into {}",
            args.hdf5.display(),
            args.bigfile.display()
        )
    })
}

/// Open `args.hdf5`, convert it, and close it.
#[cfg(feature = "hdf5")]
pub fn run(args: &Args) -> anyhow::Result<ReportConvert> {
    let source = h5bigfile_io_h5::Hdf5Source::open(&args.hdf5)
        .with_context(|| format!("Failed to open {}", args.hdf5.display()))?;
    let root = source.root()?;
    let report = convert_source(&root, args)?;
    drop(root);
    source
        .close()
        .with_context(|| format!("Failed to close {}", args.hdf5.display()))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use h5bigfile_io_h5::{EnumConvertPatternMode, MemoryDataset, MemoryGroup};
    use rstest::rstest;
    use tempfile::TempDir;

    use super::{Args, convert_source};

    #[test]
    fn parse_positional_and_defaults() {
        let args = Args::try_parse_from(["h5tobigfile", "in.h5", "out.bf"]).unwrap();
        assert_eq!(args.hdf5.to_str(), Some("in.h5"));
        assert_eq!(args.bigfile.to_str(), Some("out.bf"));

        let options = args.to_options();
        assert!(!options.if_verify);
        assert!(!options.if_dry_run);
        assert!(options.patterns_include.is_none());
        assert!(options.patterns_exclude.is_none());
        assert_eq!(options.rule_pattern, EnumConvertPatternMode::Glob);
        assert_eq!(options.bytes_per_file, None);
    }

    #[test]
    fn parse_repeatable_filters_and_flags() {
        let args = Args::try_parse_from([
            "h5tobigfile",
            "in.h5",
            "out.bf",
            "--verify",
            "--include",
            "/a/*",
            "--include",
            "/b/*",
            "--exclude",
            "tmp",
            "--pattern-mode",
            "literal",
            "--bytes-per-file",
            "4096",
            "--dry-run",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);

        let options = args.to_options();
        assert!(options.if_verify);
        assert!(options.if_dry_run);
        assert_eq!(
            options.patterns_include,
            Some(vec!["/a/*".to_string(), "/b/*".to_string()])
        );
        assert_eq!(options.patterns_exclude, Some(vec!["tmp".to_string()]));
        assert_eq!(options.rule_pattern, EnumConvertPatternMode::Literal);
        assert_eq!(options.bytes_per_file, Some(4096));
    }

    #[rstest]
    #[case(&["h5tobigfile", "in.h5"])]
    #[case(&["h5tobigfile", "in.h5", "out.bf", "--pattern-mode", "fuzzy"])]
    #[case(&["h5tobigfile", "in.h5", "out.bf", "--bytes-per-file", "-1"])]
    fn parse_rejects_bad_arguments(#[case] argv: &[&str]) {
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn convert_source_adds_context_to_errors() {
        let tmp = TempDir::new().expect("tempdir");
        let path_bf = tmp.path().join("out.bf");
        let args = Args::try_parse_from([
            "h5tobigfile",
            "in.h5",
            path_bf.to_str().unwrap(),
            "--pattern-mode",
            "regex",
            "--include",
            "(",
        ])
        .unwrap();
        let root = MemoryGroup::new("/").into_node();

        let err = convert_source(&root, &args).unwrap_err();
        assert!(err.to_string().starts_with("Failed to convert in.h5 into"));
        assert!(format!("{err:#}").contains("Invalid pattern"));
    }

    #[test]
    fn convert_source_writes_and_verifies() {
        let tmp = TempDir::new().expect("tempdir");
        let path_bf = tmp.path().join("out.bf");
        let args = Args::try_parse_from([
            "h5tobigfile",
            "in.h5",
            path_bf.to_str().unwrap(),
            "--verify",
        ])
        .unwrap();
        let root = MemoryGroup::new("/")
            .with_dataset(
                "x",
                MemoryDataset::from_values("x", &[3], &[1u16, 2, 3]).unwrap(),
            )
            .into_node();

        let report = convert_source(&root, &args).unwrap();
        assert_eq!(report.cnt_copied, 1);
        assert_eq!(report.cnt_verified, 1);
        assert!(path_bf.join("x/header").is_file());
    }
}
