//! URL → local file name mapping.
//!
//! Every image a document references gets a file name inside the
//! `<title>/` folder. The mapping is a pure function of the ordered URL
//! list: the same list always yields the same names, and no two URLs share a
//! name.

use std::collections::{HashMap, HashSet};

/// Insertion-ordered URL → local-name map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl UrlMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.index.get(url).map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    /// `(url, local_name)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(u, n)| (u.as_str(), n.as_str()))
    }

    pub fn urls(&self) -> Vec<String> {
        self.entries.iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn into_entries(self) -> Vec<(String, String)> {
        self.entries
    }

    fn push(&mut self, url: String, name: String) {
        self.index.entry(url.clone()).or_insert(self.entries.len());
        self.entries.push((url, name));
    }

    fn name_taken(&self, name: &str) -> bool {
        self.entries.iter().any(|(_, n)| n == name)
    }

    /// Drop `url` from the map, keeping the order of the rest.
    pub fn remove(&mut self, url: &str) -> Option<String> {
        let pos = self.index.remove(url)?;
        let (_, name) = self.entries.remove(pos);
        for i in self.index.values_mut() {
            if *i > pos {
                *i -= 1;
            }
        }
        Some(name)
    }

    /// Change the extension of `url`'s local name (`chart.svg` → `chart.png`),
    /// adding a `_n` suffix if the new name is already used. Returns the new
    /// name, or `None` if `url` is not mapped.
    pub fn replace_extension(&mut self, url: &str, ext: &str) -> Option<String> {
        let pos = *self.index.get(url)?;
        let current = &self.entries[pos].1;
        let stem = match current.rfind('.') {
            Some(dot) => &current[..dot],
            None => current.as_str(),
        };
        let wanted = format!("{}.{}", stem, ext);
        if wanted == *current {
            return Some(wanted);
        }
        let mut name = wanted.clone();
        let mut n = 0;
        while self.name_taken(&name) {
            n += 1;
            name = with_suffix(&wanted, n);
        }
        self.entries[pos].1 = name.clone();
        Some(name)
    }
}

/// File name a URL would get on its own: last path segment with query and
/// fragment removed, or `"image"` when that is empty.
pub fn base_name(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    match path.rsplit('/').next() {
        Some(last) if !last.is_empty() => last.to_string(),
        _ => "image".to_string(),
    }
}

/// `img.png` + 2 → `img_2.png`; `img` + 2 → `img_2`.
fn with_suffix(name: &str, n: usize) -> String {
    match name.rfind('.') {
        Some(dot) => format!("{}_{}{}", &name[..dot], n, &name[dot..]),
        None => format!("{}_{}", name, n),
    }
}

/// Assign a unique local name to every URL, in input order.
///
/// The first URL with a given base name keeps it; later ones get
/// `<stem>_<n><ext>` with `n` counting per base name. If a candidate is
/// already taken (for instance a page that links both `img.png` twice and a
/// literal `img_1.png`) the counter keeps advancing. Repeated URLs keep their
/// first name.
pub fn build_url_map<I, S>(urls: I) -> UrlMap
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut map = UrlMap::new();
    let mut taken: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();

    for url in urls {
        let url = url.as_ref();
        if map.contains(url) {
            continue;
        }
        let base = base_name(url);
        let name = if taken.contains(&base) {
            let counter = counters.entry(base.clone()).or_insert(0);
            loop {
                *counter += 1;
                let candidate = with_suffix(&base, *counter);
                if !taken.contains(&candidate) {
                    break candidate;
                }
            }
        } else {
            base
        };
        taken.insert(name.clone());
        map.push(url.to_string(), name);
    }
    map
}

/// Swap keys present in `substitution` for their replacement, keeping every
/// value and the order. Keys not in `substitution` pass through, so the
/// output always has as many entries as the input.
pub fn remap(map: &UrlMap, substitution: &HashMap<String, String>) -> UrlMap {
    let mut out = UrlMap::new();
    for (url, name) in map.iter() {
        let key = substitution.get(url).map(String::as_str).unwrap_or(url);
        out.push(key.to_string(), name.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_base_names_get_counters() {
        let map = build_url_map(["https://a.com/img.png", "https://b.com/img.png", "https://c.com/img.png"]);
        assert_eq!(map.get("https://a.com/img.png"), Some("img.png"));
        assert_eq!(map.get("https://b.com/img.png"), Some("img_1.png"));
        assert_eq!(map.get("https://c.com/img.png"), Some("img_2.png"));
    }

    #[test]
    fn query_and_fragment_ignored() {
        assert_eq!(base_name("https://x.com/a/photo.jpg?w=300"), "photo.jpg");
        assert_eq!(base_name("https://x.com/a/photo.jpg#top"), "photo.jpg");
        assert_eq!(base_name("https://x.com/a/photo.jpg?next=/b/c.png"), "photo.jpg");
    }

    #[test]
    fn empty_segment_is_image() {
        let map = build_url_map(["https://x.com/", "https://y.com/gallery/"]);
        assert_eq!(map.get("https://x.com/"), Some("image"));
        assert_eq!(map.get("https://y.com/gallery/"), Some("image_1"));
    }

    #[test]
    fn collision_with_literal_suffix_name() {
        let map = build_url_map([
            "https://a.com/img.png",
            "https://a.com/img_1.png",
            "https://b.com/img.png",
        ]);
        assert_eq!(map.get("https://a.com/img_1.png"), Some("img_1.png"));
        assert_eq!(map.get("https://b.com/img.png"), Some("img_2.png"));
        let names: HashSet<_> = map.iter().map(|(_, n)| n).collect();
        assert_eq!(names.len(), map.len());
    }

    #[test]
    fn same_list_same_map() {
        let urls = ["https://a/x.png", "https://b/x.png", "https://c/y.gif"];
        assert_eq!(build_url_map(urls), build_url_map(urls));
    }

    #[test]
    fn remap_swaps_keys_and_keeps_values() {
        let map = build_url_map(["https://a/chart.svg", "https://a/b.png"]);
        let mut sub = HashMap::new();
        sub.insert("https://a/chart.svg".to_string(), "data:image/png;base64,AAAA".to_string());
        let out = remap(&map, &sub);
        assert_eq!(out.len(), 2);
        assert_eq!(out.get("data:image/png;base64,AAAA"), Some("chart.svg"));
        assert_eq!(out.get("https://a/b.png"), Some("b.png"));
        assert!(!out.contains("https://a/chart.svg"));
        let order: Vec<_> = out.iter().map(|(_, n)| n).collect();
        assert_eq!(order, ["chart.svg", "b.png"]);
    }

    #[test]
    fn remap_keeps_size_when_substitutes_collide() {
        let map = build_url_map(["https://a/one.svg", "https://b/two.svg"]);
        let mut sub = HashMap::new();
        sub.insert("https://a/one.svg".to_string(), "data:same".to_string());
        sub.insert("https://b/two.svg".to_string(), "data:same".to_string());
        assert_eq!(remap(&map, &sub).len(), 2);
    }

    #[test]
    fn replace_extension_stays_unique() {
        let mut map = build_url_map(["https://a/chart.png", "https://a/chart.svg"]);
        let renamed = map.replace_extension("https://a/chart.svg", "png").unwrap();
        assert_eq!(renamed, "chart_1.png");
        assert_eq!(map.get("https://a/chart.png"), Some("chart.png"));
        assert!(map.replace_extension("https://nope/x.svg", "png").is_none());
    }

    #[test]
    fn remove_keeps_order() {
        let mut map = build_url_map(["https://a/1.png", "https://a/2.png", "https://a/3.png"]);
        assert_eq!(map.remove("https://a/2.png").as_deref(), Some("2.png"));
        assert_eq!(map.get("https://a/3.png"), Some("3.png"));
        assert_eq!(map.urls(), ["https://a/1.png", "https://a/3.png"]);
    }
}
