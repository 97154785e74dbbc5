//! Static dependency inference from snippet source text.

use crate::registry::LanguageProfile;
use std::collections::BTreeSet;

/// Returns the sorted, distinct third-party modules a snippet imports.
///
/// Every capture group of the profile's pattern contributes, so one pattern can
/// recognise several spellings (`require('x')` and `from 'x'`). Tokens that
/// start with `.` or `/` name local files and are skipped, as are the
/// profile's standard-library modules. Source that matches nothing, or a
/// profile without a pattern, yields an empty list.
pub fn extract_dependencies(source_text: &str, profile: &LanguageProfile) -> Vec<String> {
    let Some(pattern) = &profile.dependency_pattern else {
        return Vec::new();
    };

    let mut found = BTreeSet::new();
    for captures in pattern.captures_iter(source_text) {
        for group in captures.iter().skip(1).flatten() {
            let token = group.as_str();
            if token.is_empty() || token.starts_with('.') || token.starts_with('/') {
                continue;
            }
            found.insert(token.to_string());
        }
    }

    found
        .into_iter()
        .filter(|module| !profile.standard_library.contains(module))
        .collect()
}
