//! Fixed product catalog the stylist recommends from.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "мужской",
            Gender::Female => "женский",
        }
    }
}

#[derive(Debug)]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: &'static str,
    pub gender: Gender,
    /// Occasion -> description, in presentation order.
    pub styles: &'static [(&'static str, &'static str)],
    /// Body type -> fit advice.
    pub body_type_advice: &'static [(&'static str, &'static str)],
}

impl Product {
    pub fn style(&self, occasion: &str) -> Option<&'static str> {
        self.styles
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(occasion.trim()))
            .map(|(_, description)| *description)
    }

    /// Description fed to the image model: the casual look, else the name.
    pub fn visual_description(&self) -> &'static str {
        self.style("casual").unwrap_or(self.name)
    }

    pub fn advice_for(&self, body_type: &str) -> Option<&'static str> {
        let body_type = body_type.trim().to_lowercase();
        self.body_type_advice
            .iter()
            .find(|(name, _)| *name == body_type)
            .map(|(_, advice)| *advice)
    }
}

static PRODUCTS: [Product; 4] = [
    Product {
        id: "P101",
        name: "Мужская рубашка",
        kind: "рубашка",
        gender: Gender::Male,
        styles: &[
            ("casual", "светлая голубая в полоску, из хлопка, облегающая"),
            ("office", "белая классическая, из сатина"),
            ("party", "черная шелковая, свободного кроя"),
        ],
        body_type_advice: &[
            ("стандартный", "отлично сидит любая посадка"),
            ("плотный", "рекомендуется прямой крой, вертикальные полоски"),
            ("атлетический", "подчеркивает фигуру, можно выбрать приталенный крой"),
            ("худощавый", "прямой крой, не слишком облегающая"),
            ("полный", "свободный крой, не приталенная"),
        ],
    },
    Product {
        id: "P102",
        name: "Мужские брюки",
        kind: "брюки",
        gender: Gender::Male,
        styles: &[
            ("casual", "светлые джинсы, прямой крой"),
            ("office", "темно-серые классические, шерстяные"),
            ("party", "черные зауженные, из кожи"),
        ],
        body_type_advice: &[
            ("стандартный", "любой фасон"),
            ("плотный", "прямой крой, темные цвета"),
            ("атлетический", "можно выбрать слегка зауженные, не слишком облегающие"),
            ("худощавый", "свободный или прямой крой"),
            ("полный", "классический прямой крой"),
        ],
    },
    Product {
        id: "P103",
        name: "Мужской пиджак",
        kind: "пиджак",
        gender: Gender::Male,
        styles: &[
            ("casual", "льняной, бежевый, без подкладки"),
            ("office", "темно-синий, шерстяной, классический"),
            ("party", "бархатный, бордовый, приталенный"),
        ],
        body_type_advice: &[
            ("стандартный", "любой крой"),
            ("плотный", "однобортный, прямой крой, темные цвета"),
            ("атлетический", "приталенный, но не сковывающий движения"),
            ("худощавый", "классический, немного приталенный"),
            ("полный", "однобортный, не слишком облегающий"),
        ],
    },
    Product {
        id: "F201",
        name: "Женское платье",
        kind: "платье",
        gender: Gender::Female,
        styles: &[
            ("casual", "летнее хлопковое, свободного кроя, с цветочным принтом"),
            ("evening", "черное коктейльное, облегающее, с пайетками"),
        ],
        body_type_advice: &[
            ("стандартный", "любой фасон"),
            ("плотный", "А-силуэт, темные цвета"),
            ("атлетический", "подчеркивает талию, но не слишком обтягивает"),
            ("худощавый", "свободный крой, пышные юбки"),
            ("полный", "трапеция, вертикальные линии"),
        ],
    },
];

pub fn all() -> &'static [Product] {
    &PRODUCTS
}

pub fn get(id: &str) -> Option<&'static Product> {
    let id = id.trim();
    PRODUCTS
        .iter()
        .find(|product| product.id.eq_ignore_ascii_case(id))
}

/// First product, in catalog order, whose id appears anywhere in `text`.
pub fn find_mentioned(text: &str) -> Option<&'static Product> {
    PRODUCTS.iter().find(|product| text.contains(product.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_lookup_follows_catalog_order() {
        let answer = "- Мужские брюки: темные. Артикул: P102.\n- Мужская рубашка: Артикул: P101.";
        assert_eq!(find_mentioned(answer).map(|p| p.id), Some("P101"));
        assert_eq!(find_mentioned("Артикул: F201").map(|p| p.id), Some("F201"));
        assert!(find_mentioned("подходящего товара нет").is_none());
    }

    #[test]
    fn visual_description_prefers_casual_style() {
        let shirt = get("p101").expect("shirt exists");
        assert_eq!(
            shirt.visual_description(),
            "светлая голубая в полоску, из хлопка, облегающая"
        );
        assert_eq!(shirt.style(" Office "), Some("белая классическая, из сатина"));
        assert_eq!(shirt.style("evening"), None);
    }

    #[test]
    fn body_type_advice_is_case_insensitive() {
        let dress = get("F201").expect("dress exists");
        assert_eq!(dress.advice_for("Полный"), Some("трапеция, вертикальные линии"));
        assert_eq!(dress.advice_for("неизвестный"), None);
        assert_eq!(dress.gender.label(), "женский");
    }
}
