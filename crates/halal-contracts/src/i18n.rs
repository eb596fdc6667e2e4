use std::fmt;
use std::str::FromStr;

use crate::products::DietaryStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    #[default]
    Ru,
    En,
    Ky,
    Kk,
    Ar,
}

impl Language {
    pub const ALL: [Language; 5] = [Self::Ru, Self::Ky, Self::Kk, Self::En, Self::Ar];

    pub fn code(self) -> &'static str {
        match self {
            Self::Ru => "ru",
            Self::En => "en",
            Self::Ky => "ky",
            Self::Kk => "kk",
            Self::Ar => "ar",
        }
    }

    pub fn is_rtl(self) -> bool {
        matches!(self, Self::Ar)
    }

    /// UI strings. Kazakh and Arabic fall back to Russian.
    pub fn strings(self) -> &'static UiStrings {
        match self {
            Self::Ky => &KY_STRINGS,
            Self::En => &EN_STRINGS,
            Self::Ru | Self::Kk | Self::Ar => &RU_STRINGS,
        }
    }

    pub fn assistant_greeting(self) -> &'static str {
        match self {
            Self::Ru => "Ассаламу алейкум! Я ваш Исламский Помощник. Спросите меня о любом ингредиенте или правилах Халяль.",
            Self::En => "Assalamu Alaikum! I am your Islamic Assistant. Ask me about any ingredient or Halal rules.",
            Self::Ky => "Ассаламу алейкум! Мен сиздин исламдык жардамчыңызмын. Мага каалаган ингредиент же халал эрежелери тууралуу суроо берсеңиз болот.",
            Self::Kk => "Ассаламу алейкум! Мен сіздің исламдық көмекшіңізбін. Кез келген ингредиент немесе халал ережелері туралы сұрақ қойыңыз.",
            Self::Ar => "السلام عليكم! أنا مساعدك الإسلامي. اسألني عن أي مكون أو قواعد الحلال.",
        }
    }

    pub fn thinking_label(self) -> &'static str {
        match self {
            Self::Ru => "Размышляю...",
            Self::Ky => "Ойлонуп жатам...",
            _ => "Thinking...",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|language| language.code() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown language '{}' (expected one of: ru, ky, kk, en, ar)",
                    raw.trim()
                )
            })
    }
}

#[derive(Debug)]
pub struct UiStrings {
    pub app_name: &'static str,
    pub tagline: &'static str,
    pub analyzing: &'static str,
    database: &'static str,
    pub error_msg: &'static str,
    pub no_results: &'static str,
    categories: &'static [(&'static str, &'static str)],
    statuses: [&'static str; 3],
}

impl UiStrings {
    pub fn database(&self, count: usize) -> String {
        self.database.replace("{count}", &count.to_string())
    }

    /// Falls back to the raw id for categories without a label.
    pub fn category_label<'a>(&self, id: &'a str) -> &'a str {
        self.categories
            .iter()
            .find(|(key, _)| *key == id)
            .map(|(_, label)| *label)
            .unwrap_or(id)
    }

    pub fn status_label(&self, status: DietaryStatus) -> &'static str {
        match status {
            DietaryStatus::Halal => self.statuses[0],
            DietaryStatus::Haram => self.statuses[1],
            DietaryStatus::Mushbooh => self.statuses[2],
        }
    }
}

static RU_STRINGS: UiStrings = UiStrings {
    app_name: "HALAL HARAM",
    tagline: "Путеводитель Мусульманина",
    analyzing: "Сканирую библиотеку знаний...",
    database: "В базе: {count} продуктов",
    error_msg: "Не удалось проанализировать продукт. Попробуйте позже.",
    no_results: "Продукт не найден в локальной базе",
    categories: &[
        ("all", "Все"),
        ("snacks", "Снеки"),
        ("sweets", "Сладости"),
        ("drinks", "Напитки"),
        ("dairy", "Молочное"),
        ("meat", "Мясное"),
        ("favs", "Избранное"),
        ("e-numbers", "E-коды"),
        ("sauces", "Соусы"),
        ("frozen", "Заморозка"),
        ("bakery", "Выпечка"),
        ("baby", "Детское"),
    ],
    statuses: ["ХАЛЯЛЬ", "ХАРАМ", "СОМНИТЕЛЬНО"],
};

static KY_STRINGS: UiStrings = UiStrings {
    app_name: "HALAL HARAM",
    tagline: "Мусулмандын жол көрсөткүчү",
    analyzing: "Билим базасынан издөөдө...",
    database: "Базада: {count} продукт",
    error_msg: "Ката кетти. Кийинчерээк кайталаңыз.",
    no_results: "Табылган жок",
    categories: &[
        ("all", "Бардыгы"),
        ("snacks", "Снектер"),
        ("sweets", "Таттуулар"),
        ("drinks", "Суусундуктар"),
        ("dairy", "Сүт азыктары"),
        ("meat", "Эт азыктары"),
        ("favs", "Тандалгандар"),
        ("e-numbers", "E-коддор"),
        ("sauces", "Соустар"),
        ("frozen", "Заморозка"),
        ("bakery", "Нан азыктары"),
        ("baby", "Балдар үчүн"),
    ],
    statuses: ["ХАЛАЛ", "ХАРАМ", "КҮМӨН"],
};

static EN_STRINGS: UiStrings = UiStrings {
    app_name: "HALAL HARAM",
    tagline: "The Muslim's Guide",
    analyzing: "Searching the knowledge library...",
    database: "In database: {count} products",
    error_msg: "Could not analyze the product. Please try again later.",
    no_results: "Product not found in the local database",
    categories: &[
        ("all", "All"),
        ("snacks", "Snacks"),
        ("sweets", "Sweets"),
        ("drinks", "Drinks"),
        ("dairy", "Dairy"),
        ("meat", "Meat"),
        ("favs", "Favorites"),
        ("e-numbers", "E-codes"),
        ("sauces", "Sauces"),
        ("frozen", "Frozen"),
        ("bakery", "Bakery"),
        ("baby", "Baby"),
    ],
    statuses: ["HALAL", "HARAM", "DOUBTFUL"],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_codes_round_trip_through_from_str() {
        for language in Language::ALL {
            assert_eq!(language.code().parse::<Language>(), Ok(language));
        }
        assert_eq!(" EN ".parse::<Language>(), Ok(Language::En));
        assert!("de".parse::<Language>().is_err());
    }

    #[test]
    fn kazakh_and_arabic_fall_back_to_russian_strings() {
        assert_eq!(Language::Kk.strings().tagline, Language::Ru.strings().tagline);
        assert_eq!(Language::Ar.strings().error_msg, Language::Ru.strings().error_msg);
        assert_ne!(Language::Ky.strings().error_msg, Language::Ru.strings().error_msg);
    }

    #[test]
    fn every_language_has_its_own_greeting() {
        let mut greetings = Language::ALL
            .iter()
            .map(|language| language.assistant_greeting())
            .collect::<Vec<&str>>();
        greetings.sort();
        greetings.dedup();
        assert_eq!(greetings.len(), Language::ALL.len());
    }

    #[test]
    fn database_label_substitutes_count() {
        assert_eq!(Language::En.strings().database(12), "In database: 12 products");
    }

    #[test]
    fn labels_fall_back_to_raw_values() {
        let strings = Language::En.strings();
        assert_eq!(strings.category_label("e-numbers"), "E-codes");
        assert_eq!(strings.category_label("spices"), "spices");
        assert_eq!(strings.status_label(DietaryStatus::Mushbooh), "DOUBTFUL");
        assert!(Language::Ar.is_rtl());
    }
}
