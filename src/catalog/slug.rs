/// Characters dropped from a record name when deriving its file name
const DROPPED: [char; 5] = ['(', ')', '&', '/', ','];

/// Derive the file stem for a record name
///
/// Spaces become dashes, a handful of punctuation characters are dropped and the result is
/// lowercased. Path separators and traversal sequences never survive.
#[must_use]
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .chars()
        .filter(|c| !DROPPED.contains(c))
        .map(|c| if c == ' ' { '-' } else { c })
        .collect::<String>()
        .to_lowercase();

    slug.replace("..", "__").replace(['\\', ':', '*', '?', '"', '<', '>', '|'], "_")
}
