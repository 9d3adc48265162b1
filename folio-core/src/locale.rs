use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::PageDescriptor;

/// Label language for user-facing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ru,
}

impl Locale {
    fn page_word(self) -> &'static str {
        match self {
            Locale::En => "page",
            Locale::Ru => "Стр.",
        }
    }

    pub fn front_matter(self) -> &'static str {
        match self {
            Locale::En => "front matter",
            Locale::Ru => "Вводная часть",
        }
    }

    pub fn open_label(self) -> &'static str {
        match self {
            Locale::En => "Open",
            Locale::Ru => "Открыть",
        }
    }

    pub fn not_found(self) -> &'static str {
        match self {
            Locale::En => "page not found",
            Locale::Ru => "Страница не найдена",
        }
    }

    pub fn image_unavailable(self) -> &'static str {
        match self {
            Locale::En => "image unavailable",
            Locale::Ru => "изображение недоступно",
        }
    }

    pub fn load_failed(self) -> &'static str {
        match self {
            Locale::En => "failed to load manifest",
            Locale::Ru => "не удалось загрузить оглавление",
        }
    }

    pub fn theme_not_saved(self) -> &'static str {
        match self {
            Locale::En => "theme not saved",
            Locale::Ru => "тема не сохранена",
        }
    }

    /// Card and sidebar title: `label`, `label · page N` or `label · page S–E`.
    pub fn title(self, page: &PageDescriptor) -> String {
        match page.range() {
            Some(range) => format!("{} · {} {}", page.label(), self.page_word(), range),
            None => page.label().to_string(),
        }
    }

    /// Short indicator: `page N`, `page N–M` or the front matter marker.
    pub fn indicator(self, page: &PageDescriptor) -> String {
        match page.range() {
            Some(range) => format!("{} {}", self.page_word(), range),
            None => self.front_matter().to_string(),
        }
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "ru" => Ok(Locale::Ru),
            other => Err(format!("unsupported locale `{other}` (expected en or ru)")),
        }
    }
}
