//! Source tree traversal and conversion orchestration.

use std::path::Path;

use h5bigfile_io_bigfile::BigFile;
use log::debug;

use crate::report::{ReportConvert, ReportConvertBuilder};
use crate::source::SourceNode;
use crate::spec::{ConvertError, SpecConvertOptions};
use crate::util::{SpecConvertPatterns, join_field_path, join_group_path};
use crate::visit::{CreateVisitor, DatasetVisitor, VerifyVisitor};

struct SpecWalkContext<'a> {
    spec_convert_pats: &'a SpecConvertPatterns,
    builder_walk: ReportConvertBuilder,
}

/// Visit every terminal dataset under `node` exactly once.
///
/// Groups contribute `/<name>`; compound fields contribute `<name>/`, so a
/// field of the dataset at `p` lands at `p/<name>/`. The root path is empty.
pub fn traverse(node: &SourceNode, visitor: &mut dyn DatasetVisitor) -> Result<(), ConvertError> {
    let spec_convert_pats = SpecConvertPatterns::default();
    let mut spec_walk_ctx = SpecWalkContext {
        spec_convert_pats: &spec_convert_pats,
        builder_walk: ReportConvertBuilder::default(),
    };
    walk_node(node, "", &mut spec_walk_ctx, visitor)
}

/// Convert the source tree under `source_root` into a BigFile at `dir_bigfile`.
///
/// This function performs:
/// 1. Option validation and pattern compilation.
/// 2. Create pass: one block per matched terminal dataset.
/// 3. Optional verify pass on a read-only reopen of the destination.
///
/// Every error is fatal; blocks written before the failure are left in place.
pub fn copy_tree<P>(
    source_root: &SourceNode,
    dir_bigfile: P,
    spec_convert_options: SpecConvertOptions,
) -> Result<ReportConvert, ConvertError>
where
    P: AsRef<Path>,
{
    if spec_convert_options.bytes_per_file == Some(0) {
        return Err(ConvertError::InvalidOption(
            "Arg `bytes_per_file` must be >= 1 or None.".to_string(),
        ));
    }
    let spec_convert_pats = SpecConvertPatterns::from_raw(
        spec_convert_options.patterns_include.as_deref(),
        spec_convert_options.patterns_exclude.as_deref(),
        spec_convert_options.rule_pattern,
    )?;
    let mut spec_walk_ctx = SpecWalkContext {
        spec_convert_pats: &spec_convert_pats,
        builder_walk: ReportConvertBuilder::default(),
    };

    if spec_convert_options.if_dry_run {
        let mut visitor = CreateVisitor::new_dry_run();
        walk_node(source_root, "", &mut spec_walk_ctx, &mut visitor)?;
        let mut builder_report = spec_walk_ctx.builder_walk;
        merge_counts(&mut builder_report, visitor.into_report());
        return Ok(builder_report.build());
    }

    let path_dir_bigfile = dir_bigfile.as_ref();
    let bigfile = BigFile::create(path_dir_bigfile)?;
    let mut visitor = CreateVisitor::new(&bigfile, spec_convert_options.bytes_per_file);
    walk_node(source_root, "", &mut spec_walk_ctx, &mut visitor)?;
    let builder_create = visitor.into_report();
    bigfile.close()?;

    let mut builder_report = spec_walk_ctx.builder_walk;
    merge_counts(&mut builder_report, builder_create);

    if spec_convert_options.if_verify {
        let bigfile = BigFile::open(path_dir_bigfile)?;
        let mut visitor = VerifyVisitor::new(&bigfile);
        let mut spec_walk_ctx = SpecWalkContext {
            spec_convert_pats: &spec_convert_pats,
            builder_walk: ReportConvertBuilder::default(),
        };
        walk_node(source_root, "", &mut spec_walk_ctx, &mut visitor)?;
        merge_counts(&mut builder_report, visitor.into_report());
        bigfile.close()?;
    }

    Ok(builder_report.build())
}

/// Open an HDF5 file, convert it, and close it again.
#[cfg(feature = "hdf5")]
pub fn convert_hdf5_file<P, Q>(
    path_file_h5: P,
    dir_bigfile: Q,
    spec_convert_options: SpecConvertOptions,
) -> Result<ReportConvert, ConvertError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let source = crate::hdf5_source::Hdf5Source::open(path_file_h5)?;
    let report = copy_tree(&source.root()?, dir_bigfile, spec_convert_options)?;
    source.close()?;
    Ok(report)
}

fn walk_node(
    node: &SourceNode,
    path: &str,
    spec_walk_ctx: &mut SpecWalkContext<'_>,
    visitor: &mut dyn DatasetVisitor,
) -> Result<(), ConvertError> {
    match node {
        SourceNode::Group(group) => {
            for name in group.member_names()? {
                let child = group.member(&name)?;
                walk_node(&child, &join_group_path(path, &name), spec_walk_ctx, visitor)?;
            }
            Ok(())
        }
        SourceNode::CompoundDataset(_) => {
            for (name, child) in node.compound_fields() {
                walk_node(&child, &join_field_path(path, &name), spec_walk_ctx, visitor)?;
            }
            Ok(())
        }
        SourceNode::ScalarDataset(dataset) => {
            spec_walk_ctx.builder_walk.add_scanned();
            if spec_walk_ctx.spec_convert_pats.should_exclude(path) {
                debug!("Skipping {path} (include/exclude)");
                spec_walk_ctx.builder_walk.add_skipped();
                return Ok(());
            }
            spec_walk_ctx.builder_walk.add_matched();
            visitor.visit(dataset.as_ref(), path)
        }
    }
}

fn merge_counts(builder_report: &mut ReportConvertBuilder, other: ReportConvertBuilder) {
    builder_report.add_counts(&["cnt_copied"], other.cnt_copied);
    builder_report.add_counts(&["cnt_verified"], other.cnt_verified);
    builder_report.add_counts(&["cnt_elements"], other.cnt_elements);
    builder_report.add_counts(&["cnt_bytes"], other.cnt_bytes);
}
