//! Choice filtering for filterable parameters

use crate::canonical::Choices;

/// Keep the entries whose label or value contains `text`, ignoring case.
///
/// While the filter text is non-empty but shorter than `filter_length`, every
/// entry is kept.
pub fn filter_choices(choices: &Choices, text: &str, filter_length: u32) -> Choices {
    let needle = text.to_lowercase();
    let typed = needle.chars().count();
    if needle.is_empty() || typed < filter_length as usize {
        return choices.clone();
    }

    choices
        .iter()
        .filter(|(label, value)| {
            label.to_lowercase().contains(&needle)
                || value.render_to_string().to_lowercase().contains(&needle)
        })
        .map(|(label, value)| (label.clone(), value.clone()))
        .collect()
}
