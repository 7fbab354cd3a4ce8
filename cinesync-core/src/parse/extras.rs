use once_cell::sync::Lazy;
use regex::Regex;

/// Folder names that only ever hold bonus material.
static EXTRAS_FOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:extras?|featurettes?|trailers?|samples?|behind[\s._-]?the[\s._-]?scenes?|deleted[\s._-]?scenes?|interviews?|shorts?|special[\s._-]?features?|bonus)$",
    )
    .expect("extras folder regex should compile")
});

/// Jellyfin/Plex style `-trailer` suffixes and bare `sample` names.
static EXTRAS_FILENAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)[-_](?:trailer|sample|featurette|behindthescenes|deleted|deletedscene|interview|scene|short|extra|other)$|[\s.](?:trailer|sample)$|^(?:sample|trailer)(?:[\s._-]|$)",
    )
    .expect("extras filename regex should compile")
});

pub fn is_extras_folder(name: &str) -> bool {
    EXTRAS_FOLDER_REGEX.is_match(name.trim())
}

pub fn is_extra(stem: &str, folders: &[&str]) -> bool {
    if folders.iter().any(|folder| is_extras_folder(folder)) {
        return true;
    }
    EXTRAS_FILENAME_REGEX.is_match(stem.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_extras() {
        assert!(is_extra("Inception-trailer", &[]));
        assert!(is_extra("sample", &["Inception (2010)"]));
        assert!(is_extra("Making Of", &["Inception (2010)", "Featurettes"]));
        assert!(!is_extra("Inception (2010)", &["Inception (2010)"]));
        assert!(!is_extra("The Other Guys (2010)", &[]));
        assert!(!is_extra("Crime Scene", &[]));
    }
}
