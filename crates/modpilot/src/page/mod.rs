// Copyright 2026 Modpilot Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page state reader: module markers parsed from raw course-page HTML.
//!
//! The course page is parsed once into an owned [`CoursePage`] snapshot using
//! the `scraper` crate. Local UI-state changes (unlocking a module, marking it
//! complete) are applied to the snapshot, and every [`CoursePage::read_module`]
//! call derives a fresh [`ModuleRecord`] from the current flags.
//!
//! Markup contract:
//! - a module marker is any element carrying the class `auto_<index>`
//! - `lock` on the marker means locked, `full` means completed
//! - the closest `.lecture_content` container holds the category icon
//!   (first `.fa` element) and the `a[data-id]` link with the backend id

pub mod token;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

pub use token::{SecurityToken, TokenSource};

/// Class prefix of the per-module marker elements (`auto_0`, `auto_1`, ...).
pub const MARKER_PREFIX: &str = "auto_";
/// Class set on a locked module marker.
pub const LOCKED_CLASS: &str = "lock";
/// Class set on a completed module marker.
pub const COMPLETED_CLASS: &str = "full";
/// Container class shared by a marker, its icon and its link.
pub const CONTENT_CLASS: &str = "lecture_content";

/// Content kind of a module, which selects the completion protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Html,
    Video,
    Pdf,
    Assessment,
    Unknown,
}

impl Category {
    /// Map an icon's class list to a category.
    pub fn from_icon_classes<'a>(classes: impl IntoIterator<Item = &'a str>) -> Self {
        let mut found = Category::Unknown;
        for class in classes {
            let candidate = match class {
                "fa-file-code-o" => Category::Html,
                "fa-file-movie-o" => Category::Video,
                "fa-file-pdf-o" => Category::Pdf,
                "fa-file-text-o" => Category::Assessment,
                _ => continue,
            };
            // Mirrors the priority order html > video > pdf > assessment.
            if found == Category::Unknown || candidate.priority() < found.priority() {
                found = candidate;
            }
        }
        found
    }

    fn priority(self) -> u8 {
        match self {
            Category::Html => 0,
            Category::Video => 1,
            Category::Pdf => 2,
            Category::Assessment => 3,
            Category::Unknown => 4,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Html => write!(f, "html"),
            Self::Video => write!(f, "video"),
            Self::Pdf => write!(f, "pdf"),
            Self::Assessment => write!(f, "assessment"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A module as currently seen on the page.
///
/// Always derived fresh from [`CoursePage`]; never held across processing steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub index: usize,
    pub locked: bool,
    pub completed: bool,
    pub category: Category,
    pub external_id: Option<String>,
}

/// Mutable per-module flags plus the static attributes read from markup.
#[derive(Debug, Clone)]
struct ModuleMarker {
    locked: bool,
    completed: bool,
    category: Category,
    external_id: Option<String>,
}

/// Owned snapshot of a course page.
#[derive(Debug, Clone, Default)]
pub struct CoursePage {
    modules: Vec<ModuleMarker>,
    meta_token: Option<String>,
    field_token: Option<String>,
}

impl CoursePage {
    /// Parse a course page from raw HTML.
    ///
    /// Markers are probed at sequential indices; the first absent index ends
    /// the probe, so markers past a gap are never seen.
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let icon_sel = Selector::parse(".fa").expect("icon selector is valid");
        let link_sel = Selector::parse("a[data-id]").expect("link selector is valid");

        let mut modules = Vec::new();
        loop {
            let Ok(marker_sel) = Selector::parse(&format!(".{MARKER_PREFIX}{}", modules.len()))
            else {
                break;
            };
            let Some(marker) = document.select(&marker_sel).next() else {
                break;
            };
            modules.push(read_marker(marker, &icon_sel, &link_sel));
        }

        let (meta_token, field_token) = token::scan_document(&document);

        Self {
            modules,
            meta_token,
            field_token,
        }
    }

    /// Read the module at `index`, or `None` past the last marker.
    pub fn read_module(&self, index: usize) -> Option<ModuleRecord> {
        self.modules.get(index).map(|m| ModuleRecord {
            index,
            locked: m.locked && !m.completed,
            completed: m.completed,
            category: m.category,
            external_id: m.external_id.clone(),
        })
    }

    /// Number of modules: the smallest index with no marker.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Indices of modules that currently carry the completed marker.
    pub fn completed_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, m)| m.completed)
            .map(|(i, _)| i)
    }

    /// Count completed markers among the first `limit` modules.
    pub fn completed_within(&self, limit: usize) -> usize {
        self.completed_indices().filter(|&i| i < limit).count()
    }

    /// Clear the locked flag of a module. Returns `false` if it does not exist.
    pub fn unlock(&mut self, index: usize) -> bool {
        match self.modules.get_mut(index) {
            Some(m) => {
                m.locked = false;
                true
            }
            None => false,
        }
    }

    /// Mark a module completed and unlock its successor.
    ///
    /// Only module `index + 1` is touched besides `index` itself.
    pub fn mark_complete(&mut self, index: usize) -> bool {
        let Some(m) = self.modules.get_mut(index) else {
            return false;
        };
        m.locked = false;
        m.completed = true;
        self.unlock(index + 1);
        true
    }

    /// Token embedded in the document metadata or hidden form field.
    pub(crate) fn document_tokens(&self) -> (Option<&str>, Option<&str>) {
        (self.meta_token.as_deref(), self.field_token.as_deref())
    }
}

fn read_marker(marker: ElementRef<'_>, icon_sel: &Selector, link_sel: &Selector) -> ModuleMarker {
    let has_class = |class: &str| marker.value().classes().any(|c| c == class);
    let locked = has_class(LOCKED_CLASS);
    let completed = has_class(COMPLETED_CLASS);

    let container = closest_content(marker);
    let category = container
        .and_then(|c| c.select(icon_sel).next())
        .map(|icon| Category::from_icon_classes(icon.value().classes()))
        .unwrap_or(Category::Unknown);
    let external_id = container
        .and_then(|c| c.select(link_sel).next())
        .and_then(|link| link.value().attr("data-id"))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    ModuleMarker {
        locked,
        completed,
        category,
        external_id,
    }
}

/// The marker itself or its nearest ancestor with the content class.
fn closest_content(marker: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let is_content = |el: &ElementRef<'_>| el.value().classes().any(|c| c == CONTENT_CLASS);
    if is_content(&marker) {
        return Some(marker);
    }
    marker
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| is_content(el))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html><head><meta name="csrfToken" content="tok-meta"></head><body>
          <div class="lecture_content">
            <span class="auto_0 full"></span><i class="fa fa-file-movie-o"></i>
            <a href="#" data-id="v-100">Intro video</a>
          </div>
          <div class="lecture_content">
            <span class="auto_1 lock"></span><i class="fa fa-file-pdf-o"></i>
            <a href="#" data-id="p-200">Handout</a>
          </div>
          <div class="lecture_content">
            <span class="auto_2 lock"></span><i class="fa fa-file-text-o"></i>
            <a href="#" data-id="q-300">Quiz</a>
          </div>
          <div class="lecture_content">
            <span class="auto_3 lock"></span><i class="fa fa-star"></i>
          </div>
          <div class="lecture_content">
            <span class="auto_5"></span><i class="fa fa-file-code-o"></i>
          </div>
        </body></html>
    "##;

    #[test]
    fn test_module_count_stops_at_first_gap() {
        let page = CoursePage::parse(PAGE);
        assert_eq!(page.module_count(), 4);
        assert!(page.read_module(4).is_none());
        assert!(page.read_module(5).is_none());
    }

    #[test]
    fn test_read_module_fields() {
        let page = CoursePage::parse(PAGE);

        let first = page.read_module(0).unwrap();
        assert!(first.completed);
        assert!(!first.locked);
        assert_eq!(first.category, Category::Video);
        assert_eq!(first.external_id.as_deref(), Some("v-100"));

        let second = page.read_module(1).unwrap();
        assert!(second.locked);
        assert_eq!(second.category, Category::Pdf);

        assert_eq!(page.read_module(2).unwrap().category, Category::Assessment);

        let fourth = page.read_module(3).unwrap();
        assert_eq!(fourth.category, Category::Unknown);
        assert!(fourth.external_id.is_none());
    }

    #[test]
    fn test_marker_outside_container_is_unknown() {
        let page = CoursePage::parse(r#"<div><span class="auto_0"></span></div>"#);
        let record = page.read_module(0).unwrap();
        assert_eq!(record.category, Category::Unknown);
        assert!(record.external_id.is_none());
    }

    #[test]
    fn test_mark_complete_unlocks_only_successor() {
        let mut page = CoursePage::parse(PAGE);
        assert!(page.mark_complete(1));

        let done = page.read_module(1).unwrap();
        assert!(done.completed && !done.locked);
        assert!(!page.read_module(2).unwrap().locked);
        assert!(page.read_module(3).unwrap().locked);
    }

    #[test]
    fn test_mark_complete_last_module() {
        let mut page = CoursePage::parse(PAGE);
        assert!(page.mark_complete(3));
        assert_eq!(page.module_count(), 4);
        assert!(!page.mark_complete(9));
    }

    #[test]
    fn test_completed_within_limit() {
        let mut page = CoursePage::parse(PAGE);
        page.mark_complete(2);
        assert_eq!(page.completed_within(4), 2);
        assert_eq!(page.completed_within(1), 1);
    }

    #[test]
    fn test_category_from_icon_classes() {
        assert_eq!(
            Category::from_icon_classes(["fa", "fa-file-code-o"]),
            Category::Html
        );
        assert_eq!(
            Category::from_icon_classes(["fa-file-text-o", "fa-file-movie-o"]),
            Category::Video
        );
        assert_eq!(Category::from_icon_classes(["fa"]), Category::Unknown);
        assert_eq!(Category::Pdf.to_string(), "pdf");
    }
}
