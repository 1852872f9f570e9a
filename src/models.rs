//! Human-readable names for remote model ids.

/// Labels for the models the server is known to host.
const KNOWN_MODELS: &[(&str, &str, &str)] = &[
    (
        "doktorllama3",
        "Doktor Llama 3",
        "Tıbbi sorular ve sağlık bilgisi için uzmanlaşmış model.",
    ),
    (
        "warnchat",
        "Warnchat (12B)",
        "Mantık seviyesi yüksek, derinlemesine analiz yapan zeka.",
    ),
    (
        "kumru",
        "Kumru",
        "Akıcı ve son derece doğal Türkçe sohbet yeteneği.",
    ),
    (
        "turkish-gemma",
        "Turkish Gemma (9B)",
        "Geniş bilgi hazinesi ve dengeli Türkçe dil desteği.",
    ),
    (
        "rn_tr_r2",
        "Refined Neuro R2",
        "Yaratıcı yazım ve akademik analiz için optimize edildi.",
    ),
    (
        "gemma2:2b",
        "Gemma 2 (2B)",
        "Hızlı yanıt veren, genel amaçlı hafif asistan.",
    ),
];

/// Served by the backend but not offered for chat (vision, embedding and coding models).
pub const HIDDEN_MODELS: &[&str] = &[
    "llama3.2-vision:11b",
    "necdetuygur/developer:latest",
    "nomic-embed-text:latest",
    "codegemma:7b",
    "qwen2.5-coder:7b",
];

pub fn is_hidden_model(id: &str) -> bool {
    HIDDEN_MODELS.contains(&id)
}

fn known(id: &str) -> Option<&'static (&'static str, &'static str, &'static str)> {
    let lower = id.to_lowercase();
    KNOWN_MODELS.iter().find(|(key, _, _)| lower.contains(key))
}

/// "alibayram/llama3:8b" → "Llama3 (8B)"
pub fn display_model_name(id: &str) -> String {
    if id.trim().is_empty() {
        return "Bilinmeyen Model".to_string();
    }
    if let Some((_, label, _)) = known(id) {
        return (*label).to_string();
    }

    let mut name = id.rsplit('/').next().unwrap_or(id).replace(":latest", "");
    if let Some((base, tag)) = name.split_once(':') {
        let tag = tag.split(':').next().unwrap_or(tag);
        name = format!("{base} ({})", tag.to_uppercase());
    }

    name.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn model_description(id: &str) -> &'static str {
    known(id)
        .map(|(_, _, description)| *description)
        .unwrap_or("Genel amaçlı yapay zeka yardımcısı.")
}
