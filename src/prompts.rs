use crate::catalog::Product;
use crate::db::models::{UserRow, WardrobeItemRow};

pub const DEFAULT_IMAGE_MESSAGE: &str = "Проанализируй это фото и дай стилистические рекомендации.";

pub const EMPTY_REQUEST_ERROR: &str = "Необходимо ввести текст запроса или загрузить фотографию.";

pub const MODEL_FALLBACK_TEXT: &str = "Не удалось получить ответ от AI.";

pub const NEGATIVE_PROMPT: &str = "bad anatomy, ugly, deformed, disfigured, blurry, low resolution, \
low quality, noise, grainy, monochrome, bad composition, watermark, \
signature, text, human, person, body, multiple limbs, extra digits, \
shadows, background objects, complex background, text, writing";

const PRODUCT_PHOTO_SUFFIX: &str = "isolated, on pure white background, no human, no person, \
clean product photography, studio lighting, \
high resolution, photorealistic, best quality, masterwork, \
perfectly cut out, white backdrop, no shadows";

/// Stored profile data folded into the stylist prompt.
pub struct ProfileContext<'a> {
    pub user: &'a UserRow,
    pub wardrobe: &'a [WardrobeItemRow],
}

fn catalog_listing(catalog: &[Product], body_type: &str) -> String {
    catalog
        .iter()
        .map(|product| {
            let styles = product
                .styles
                .iter()
                .map(|(occasion, description)| format!("{occasion}: {description}"))
                .collect::<Vec<_>>()
                .join("; ");
            let mut line = format!(
                "- {} ({}, пол: {}). Артикул: {}. Варианты: {}.",
                product.name,
                product.kind,
                product.gender.label(),
                product.id,
                styles
            );
            if let Some(advice) = product.advice_for(body_type) {
                line.push_str(&format!(" Для телосложения '{body_type}': {advice}."));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn profile_section(profile: &ProfileContext<'_>) -> String {
    let mut section = String::from("Профиль пользователя:");
    if let Some(gender) = profile.user.gender.as_deref().filter(|g| !g.trim().is_empty()) {
        section.push_str(&format!(" пол: {gender}."));
    }
    if profile.wardrobe.is_empty() {
        section.push_str(" Гардероб пока пуст.");
        return section;
    }
    section.push_str(" Уже есть в гардеробе:");
    for item in profile.wardrobe {
        section.push_str(&format!(
            "\n- {} ({}, стиль: {})",
            item.category, item.color, item.style
        ));
    }
    section.push_str("\nПредлагай вещи, которые сочетаются с этим гардеробом.");
    section
}

pub fn stylist_prompt(
    body_type: &str,
    catalog: &[Product],
    profile: Option<&ProfileContext<'_>>,
) -> String {
    let ids = catalog
        .iter()
        .map(|product| format!("`{}`", product.id))
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = format!(
        "Ты AI стилист StyleSynth. Твоя задача - подбирать одежду и давать стильные советы, \
учитывая запросы пользователя и тип телосложения '{body_type}'. \
Отвечай кратко, но информативно. \
Если пользователь загрузил фото, сначала **определи пол человека на фото** и **кратко проанализируй \
общий стиль или основные элементы одежды на этом фото**. Затем, используя этот анализ, **дай рекомендации \
по одежде, подходящей для определенного пола, из нашей базы данных ({ids})**. Объясни, как она дополнит \
или изменит текущий образ, и как она подходит к телосложению и полу. \
Если запрос касается предмета одежды (без фото), просто найди подходящий в нашей базе данных, укажи артикул \
и **обязательно учти пол, если он указан в запросе, или предложи универсальный вариант/спроси уточнение**. \
**Важно: Ответ должен быть максимально структурирован, в формате списка. Для каждого рекомендованного \
предмета одежды используй формат: \
 - [Название предмета]: [Краткое описание предмета и его преимущества для фигуры]. Артикул: [Артикул].** \
Пример ответа: \
На фото (мужчина/женщина) в (краткий анализ стиля/одежды). Отличный выбор! Для вашего (ТипТелосложения) \
телосложения, рекомендую: \
 - Мужская рубашка: Светлая голубая в полоску, из хлопка, облегающая, подчеркнет ваш торс. Артикул: P101. \
 - Мужские брюки: Темно-серые классические, шерстяные, создадут строгий образ. Артикул: P102. \
Если подходящего товара нет в базе данных, так и скажи и предложи поискать что-то другое."
    );

    prompt.push_str("\n\nБаза данных товаров:\n");
    prompt.push_str(&catalog_listing(catalog, body_type));

    if let Some(profile) = profile {
        prompt.push_str("\n\n");
        prompt.push_str(&profile_section(profile));
    }

    prompt
}

pub fn user_request_part(message: &str) -> String {
    format!("Запрос пользователя: '{message}'")
}

pub fn wardrobe_analysis_prompt() -> &'static str {
    "Определи предмет одежды на фото. Ответь ТОЛЬКО JSON-объектом без пояснений в формате \
{\"category\": \"тип вещи (например, рубашка, брюки, платье)\", \"color\": \"основной цвет\", \
\"style\": \"стиль (casual, office, party, evening, sport)\", \"description\": \"одно короткое предложение\"}. \
Если на фото несколько вещей, опиши самую заметную."
}

pub fn product_image_prompt(description: &str) -> String {
    format!("{description}, {PRODUCT_PHOTO_SUFFIX}")
}
