use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::http_client::HttpClient;
use crate::models::{Category, ImageUpload};

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Best-effort pre-fill for the item creation form. Advisory only: the
/// caller always gets a suggestion object, possibly empty, never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemSuggestion {
    pub title: String,
    pub description: String,
    pub category: String,
}

#[derive(Clone)]
pub struct VisionService {
    api_key: Option<String>,
    model: String,
    http_client: HttpClient,
}

impl VisionService {
    pub fn new(config: &Config) -> Self {
        Self {
            api_key: config.google_api_key.clone(),
            model: config.vision_model.clone(),
            http_client: HttpClient::new(),
        }
    }

    /// Ask the vision model to suggest title/description/category for a
    /// set of photos of one item. All images go in a single request so the
    /// model can reconcile details across angles.
    pub async fn suggest(&self, images: &[ImageUpload]) -> ItemSuggestion {
        let Some(api_key) = &self.api_key else {
            tracing::warn!("GOOGLE_API_KEY is not set; skipping vision analysis");
            return ItemSuggestion::default();
        };
        if images.is_empty() {
            return ItemSuggestion::default();
        }

        let endpoint = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_BASE,
            self.model,
            urlencoding::encode(api_key)
        );
        let body = request_body(images);

        let response = match self.http_client.post_json(&endpoint, &body).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("vision API request failed: {}", e);
                return ItemSuggestion::default();
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(500).collect();
            tracing::error!("vision API HTTP error {}: {}", status, snippet);
            return ItemSuggestion::default();
        }

        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("vision API returned unreadable body: {}", e);
                return ItemSuggestion::default();
            }
        };

        let Some(text) = data["candidates"][0]["content"]["parts"][0]["text"].as_str() else {
            tracing::error!("vision API response had no candidate text: {}", data);
            return ItemSuggestion::default();
        };

        suggestion_from_text(text)
    }
}

fn request_body(images: &[ImageUpload]) -> Value {
    let mut parts = vec![json!({ "text": prompt() })];
    for image in images {
        parts.push(json!({
            "inline_data": {
                "mime_type": image.content_type,
                "data": BASE64.encode(&image.bytes),
            }
        }));
    }
    json!({
        "contents": [{ "parts": parts }],
        "generationConfig": {
            "temperature": 0.4,
            "response_mime_type": "application/json",
        },
    })
}

fn prompt() -> String {
    concat!(
        "You are helping catalog lost-and-found items for a school reception desk. ",
        "You may receive several photos of the same item from different angles; ",
        "reconcile them into one suggestion. ",
        "Respond with JSON only, with this exact shape:\n",
        "{ \"title\": \"short, specific title\", ",
        "\"description\": \"detailed description with brand, color, size, model, visible markings\", ",
        "\"category\": \"one of: Electronics, Bags and Carry, Sports and Clothing, ",
        "Bottles and Containers, Documents and IDs, Notebooks/Books, Other/Misc\" }.\n",
        "Description rules: for electronics, start with the brand and model before ",
        "color or condition. If a notebook cover shows the school crest exercise-book ",
        "pattern, call it a school exercise notebook and mention any subject label. ",
        "Do not include any explanation or text outside the JSON. Return only valid JSON."
    )
    .to_string()
}

fn suggestion_from_text(text: &str) -> ItemSuggestion {
    let Some(parsed) = extract_json(text) else {
        tracing::error!("vision reply held no parsable JSON object");
        return ItemSuggestion::default();
    };

    let title = parsed["title"].as_str().unwrap_or("").trim().to_string();
    let description = parsed["description"].as_str().unwrap_or("").trim().to_string();
    let category_raw = parsed["category"].as_str().unwrap_or("").trim().to_string();

    if title.is_empty() && description.is_empty() {
        tracing::warn!("vision model returned empty title/description: {}", parsed);
    }

    ItemSuggestion {
        title,
        description,
        category: normalize_category(&category_raw).as_str().to_string(),
    }
}

/// The model is told to answer with bare JSON, but replies sometimes come
/// fenced or wrapped in prose; take the outermost brace pair.
fn extract_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if value.is_object() {
            return Some(value);
        }
    }

    static JSON_RE: OnceLock<Regex> = OnceLock::new();
    let re = JSON_RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid literal regex"));
    let candidate = re.find(text)?;
    serde_json::from_str::<Value>(candidate.as_str())
        .ok()
        .filter(|v| v.is_object())
}

/// Map the model's free-text category onto the fixed enum. Both the
/// current names and the older "clothing and wearables" wording match.
pub fn normalize_category(value: &str) -> Category {
    let v = value.to_lowercase();
    let has = |needle: &str| v.contains(needle);

    if has("electronic") || has("laptop") || has("phone") || has("tablet") || has("charger") {
        Category::Electronics
    } else if has("bag") || has("backpack") || has("carry") || has("luggage") {
        Category::BagsAndCarry
    } else if has("sport")
        || has("cloth")
        || has("shirt")
        || has("pants")
        || has("jacket")
        || has("shoe")
        || has("wearable")
    {
        Category::SportsAndClothing
    } else if has("bottle") || has("flask") || has("container") || has("tupperware") {
        Category::BottlesAndContainers
    } else if has("document") || has("passport") || has("license") || has("card") || has("id") {
        Category::DocumentsAndIds
    } else if has("notebook") || has("book") || has("diary") {
        Category::NotebooksAndBooks
    } else {
        Category::OtherMisc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_known_keywords() {
        assert_eq!(normalize_category("Laptop charger"), Category::Electronics);
        assert_eq!(normalize_category("red Nike backpack"), Category::BagsAndCarry);
        assert_eq!(normalize_category("Sports and Clothing"), Category::SportsAndClothing);
        assert_eq!(normalize_category("clothing and wearables"), Category::SportsAndClothing);
        assert_eq!(normalize_category("water bottle"), Category::BottlesAndContainers);
        assert_eq!(normalize_category("student ID card"), Category::DocumentsAndIds);
        assert_eq!(normalize_category("maths exercise book"), Category::NotebooksAndBooks);
    }

    #[test]
    fn unknown_text_defaults_to_misc() {
        assert_eq!(normalize_category(""), Category::OtherMisc);
        assert_eq!(normalize_category("umbrella"), Category::OtherMisc);
    }

    #[test]
    fn extracts_bare_json() {
        let value = extract_json(r#"{"title": "Black cap"}"#).unwrap();
        assert_eq!(value["title"], "Black cap");
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "```json\n{\"title\": \"Blue flask\", \"category\": \"bottle\"}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["title"], "Blue flask");
    }

    #[test]
    fn extracts_json_wrapped_in_prose() {
        let text = "Sure! Here is the item:\n{\"title\": \"Casio watch\"}\nHope that helps.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["title"], "Casio watch");
    }

    #[test]
    fn garbage_yields_no_json() {
        assert!(extract_json("no braces here").is_none());
        assert!(extract_json("{not valid json}").is_none());
    }

    #[test]
    fn suggestion_normalizes_category_field() {
        let suggestion = suggestion_from_text(
            r#"{"title": "Nike backpack", "description": "Red, 20L", "category": "backpack"}"#,
        );
        assert_eq!(suggestion.title, "Nike backpack");
        assert_eq!(suggestion.category, "BAGS_AND_CARRY");
    }

    #[test]
    fn unparsable_reply_degrades_to_empty_suggestion() {
        assert_eq!(suggestion_from_text("the item is a hat"), ItemSuggestion::default());
    }

    #[test]
    fn request_bundles_all_images_into_one_call() {
        let images = vec![
            ImageUpload {
                bytes: vec![1, 2, 3],
                content_type: "image/jpeg".to_string(),
            },
            ImageUpload {
                bytes: vec![4, 5],
                content_type: "image/png".to_string(),
            },
        ];
        let body = request_body(&images);
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        // One text part plus one inline_data part per image.
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[2]["inline_data"]["mime_type"], "image/png");
    }
}
