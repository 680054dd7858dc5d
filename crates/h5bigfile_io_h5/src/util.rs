use globset::{Glob, GlobMatcher};
use regex::Regex;

use crate::spec::{ConvertError, EnumConvertPatternMode};

////////////////////////////////////////////////////////////////////////////////
// #region PatternMatching

#[derive(Debug, Clone)]
pub(crate) enum TypeConvertPatternSeq {
    Literal(Vec<String>),
    Glob(Vec<GlobMatcher>),
    Regex(Vec<Regex>),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SpecConvertPatterns {
    pub(crate) patterns_include: Option<TypeConvertPatternSeq>,
    pub(crate) patterns_exclude: Option<TypeConvertPatternSeq>,
}

impl SpecConvertPatterns {
    pub(crate) fn from_raw(
        patterns_include: Option<&[String]>,
        patterns_exclude: Option<&[String]>,
        rule_pattern: EnumConvertPatternMode,
    ) -> Result<Self, ConvertError> {
        Ok(Self {
            patterns_include: _compile(patterns_include, rule_pattern)?,
            patterns_exclude: _compile(patterns_exclude, rule_pattern)?,
        })
    }

    /// True when `path` is filtered out by the include/exclude lists.
    pub(crate) fn should_exclude(&self, path: &str) -> bool {
        should_exclude_by_patterns(
            path,
            self.patterns_include.as_ref(),
            self.patterns_exclude.as_ref(),
        )
    }
}

fn _compile(
    patterns: Option<&[String]>,
    rule_pattern: EnumConvertPatternMode,
) -> Result<Option<TypeConvertPatternSeq>, ConvertError> {
    let Some(patterns) = patterns else {
        return Ok(None);
    };
    if patterns.is_empty() {
        return Ok(None);
    }

    match rule_pattern {
        EnumConvertPatternMode::Literal => {
            Ok(Some(TypeConvertPatternSeq::Literal(patterns.to_vec())))
        }
        EnumConvertPatternMode::Glob => {
            let mut l_glob = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let matcher = Glob::new(pattern)
                    .map_err(|e| ConvertError::InvalidPattern(e.to_string()))?
                    .compile_matcher();
                l_glob.push(matcher);
            }
            Ok(Some(TypeConvertPatternSeq::Glob(l_glob)))
        }
        EnumConvertPatternMode::Regex => {
            let mut l_regex = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let regex =
                    Regex::new(pattern).map_err(|e| ConvertError::InvalidPattern(e.to_string()))?;
                l_regex.push(regex);
            }
            Ok(Some(TypeConvertPatternSeq::Regex(l_regex)))
        }
    }
}

fn _is_pattern_matching(value: &str, patterns: &TypeConvertPatternSeq) -> bool {
    match patterns {
        TypeConvertPatternSeq::Literal(v) => v.iter().any(|p| value.contains(p.as_str())),
        TypeConvertPatternSeq::Glob(v) => v.iter().any(|p| p.is_match(value)),
        TypeConvertPatternSeq::Regex(v) => v.iter().any(|p| p.is_match(value)),
    }
}

pub(crate) fn should_exclude_by_patterns(
    value: &str,
    patterns_include: Option<&TypeConvertPatternSeq>,
    patterns_exclude: Option<&TypeConvertPatternSeq>,
) -> bool {
    let if_included = patterns_include.is_none_or(|p| _is_pattern_matching(value, p));
    let if_excluded = patterns_exclude.is_some_and(|p| _is_pattern_matching(value, p));
    !if_included || if_excluded
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DestinationPaths

/// Destination path of a group member.
pub(crate) fn join_group_path(prefix: &str, name: &str) -> String {
    format!("{prefix}/{name}")
}

/// Destination path of a compound field; always ends with `/`.
pub(crate) fn join_field_path(prefix: &str, name: &str) -> String {
    if prefix.ends_with('/') {
        format!("{prefix}{name}/")
    } else {
        format!("{prefix}/{name}/")
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
