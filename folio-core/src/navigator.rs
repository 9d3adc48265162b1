use std::fmt;

use thiserror::Error;

use crate::model::PageIndex;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("empty query")]
    EmptyQuery,
    #[error("no page matches `{query}`")]
    NotFound { query: String },
}

/// Canonical key the sidebar hands to the navigator: the numeric start of a
/// descriptor when it has one, its label otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationKey {
    Page(u32),
    Label(String),
}

impl fmt::Display for NavigationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationKey::Page(page) => write!(f, "{page}"),
            NavigationKey::Label(label) => f.write_str(label),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    PageNumber,
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    /// Position of the matching descriptor in the index.
    pub position: usize,
    pub kind: MatchKind,
}

/// Resolves a free-form query to a descriptor.
///
/// Integer queries first look for a descriptor whose page range contains the
/// number. If none does, or the query is not an integer, the lowercased query
/// is matched as a substring of each label. The first match in document
/// order wins.
pub fn locate(index: &PageIndex, query: &str) -> Result<Located, LocateError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(LocateError::EmptyQuery);
    }

    if let Ok(number) = query.parse::<u32>() {
        let hit = index
            .iter()
            .position(|page| page.range().is_some_and(|range| range.contains(number)));
        if let Some(position) = hit {
            return Ok(Located {
                position,
                kind: MatchKind::PageNumber,
            });
        }
    }

    let needle = query.to_lowercase();
    index
        .iter()
        .position(|page| page.search_key().contains(&needle))
        .map(|position| Located {
            position,
            kind: MatchKind::Label,
        })
        .ok_or_else(|| LocateError::NotFound {
            query: query.to_string(),
        })
}

pub fn key_for(index: &PageIndex, position: usize) -> Option<NavigationKey> {
    let page = index.get(position)?;
    Some(match page.range() {
        Some(range) => NavigationKey::Page(range.start()),
        None => NavigationKey::Label(page.label().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;

    fn index() -> PageIndex {
        Manifest::from_json(
            r#"{"title":"T","pages":[
                {"label":"Intro","start":null,"end":null,"src":"a.png"},
                {"label":"Ch1","start":1,"end":3,"src":"b.png"},
                {"label":"Chapter 12 notes","start":4,"end":9,"src":"c.png"},
                {"label":"Index","start":null,"end":null,"src":"d.png"}
            ]}"#,
        )
        .unwrap()
        .index
    }

    #[test]
    fn numeric_query_hits_containing_range() {
        let index = index();
        let hit = locate(&index, "2").unwrap();
        assert_eq!(hit.position, 1);
        assert_eq!(hit.kind, MatchKind::PageNumber);
        assert_eq!(locate(&index, " 9 ").unwrap().position, 2);
    }

    #[test]
    fn text_query_is_case_insensitive_first_match() {
        let index = index();
        assert_eq!(locate(&index, "intro").unwrap().position, 0);
        // "in" occurs in "Intro" and "Index"; document order decides.
        assert_eq!(locate(&index, "IN").unwrap().position, 0);
        assert_eq!(locate(&index, "ch").unwrap().position, 1);
    }

    #[test]
    fn numeric_query_falls_back_to_label_search() {
        let index = index();
        let hit = locate(&index, "12").unwrap();
        assert_eq!(hit.position, 2);
        assert_eq!(hit.kind, MatchKind::Label);
    }

    #[test]
    fn unmatched_query_reports_not_found() {
        let index = index();
        assert_eq!(
            locate(&index, "99"),
            Err(LocateError::NotFound {
                query: "99".to_string()
            })
        );
        assert_eq!(locate(&index, "   "), Err(LocateError::EmptyQuery));
    }

    #[test]
    fn keys_prefer_page_numbers() {
        let index = index();
        assert_eq!(key_for(&index, 0), Some(NavigationKey::Label("Intro".into())));
        assert_eq!(key_for(&index, 2), Some(NavigationKey::Page(4)));
        assert_eq!(key_for(&index, 9), None);
        for position in 0..index.len() {
            let key = key_for(&index, position).unwrap();
            assert_eq!(locate(&index, &key.to_string()).unwrap().position, position);
        }
    }
}
