/*
Simple i18n helper for the backend.

This module provides:
- A tiny embedded translations store for PT/EN (compile-time embedded JSON).
- A simple `tr` function to lookup translations by key + optional params.
- A `t` convenience wrapper using the default language (DEFAULT_LANG).

Usage:
    use crate::i18n;
    let msg = i18n::t("not_found.event");
    let body = i18n::tr(Some("en"), "reminder.push_body", Some(&[("minutes", "15"), ("time", "09:00")]));

Notes:
- Placeholders in translation strings use single-brace format: `{name}`.
- Default language is `pt`. If a key is missing for the requested language,
  the fallback language will be used.
*/

use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_LANG: &str = "pt";

static TRANSLATIONS: OnceLock<HashMap<String, HashMap<String, String>>> = OnceLock::new();

const PT_JSON: &str = r#"
{
  "app.name": "Agenda",
  "reminder.push_title": "{app}: {title}",
  "reminder.push_body": "Começa em {minutes} min: {time}",
  "reminder.chat_message": "🔔 <b>{app} Alerta</b>\n\n📅 <b>{title}</b>\n⏰ Horário: {time}\n⏳ Faltam {minutes} minutos.",
  "not_found.event": "Evento não encontrado",
  "not_found.subscription": "Inscrição de push não encontrada",
  "validation.invalid_date": "Data inválida: {value}. Use o formato AAAA-MM-DD",
  "validation.range_order": "A data final deve ser igual ou posterior à inicial",
  "validation.range_too_long": "O intervalo pode ter no máximo {max} dias",
  "validation.upcoming_days": "days deve estar entre 1 e {max}",
  "validation.lead_minutes": "notification_minutes_before deve estar entre 0 e {max}",
  "validation.endpoint_required": "O endpoint da inscrição é obrigatório",
  "validation.push_keys_required": "As chaves p256dh e auth são obrigatórias",
  "push.subscribed": "Inscrição de push salva",
  "push.unsubscribed": "Inscrição de push removida",
  "push.not_configured": "Web Push não está configurado no servidor",
  "telegram.linked": "Telegram conectado com sucesso",
  "telegram.unlinked": "Telegram desconectado com sucesso",
  "event.deleted": "Evento excluído",
  "error.unsupported_language": "Idioma não suportado: {lang}"
}
"#;

const EN_JSON: &str = r#"
{
  "app.name": "Agenda",
  "reminder.push_title": "{app}: {title}",
  "reminder.push_body": "Starts in {minutes} min: {time}",
  "reminder.chat_message": "🔔 <b>{app} Reminder</b>\n\n📅 <b>{title}</b>\n⏰ Time: {time}\n⏳ {minutes} minutes left.",
  "not_found.event": "Event not found",
  "not_found.subscription": "Push subscription not found",
  "validation.invalid_date": "Invalid date: {value}. Use the YYYY-MM-DD format",
  "validation.range_order": "The end date must be on or after the start date",
  "validation.range_too_long": "The range may span at most {max} days",
  "validation.upcoming_days": "days must be between 1 and {max}",
  "validation.lead_minutes": "notification_minutes_before must be between 0 and {max}",
  "validation.endpoint_required": "Subscription endpoint is required",
  "validation.push_keys_required": "Both p256dh and auth keys are required",
  "push.subscribed": "Push subscription saved",
  "push.unsubscribed": "Push subscription removed",
  "push.not_configured": "Web Push is not configured on the server",
  "telegram.linked": "Telegram linked",
  "telegram.unlinked": "Telegram unlinked",
  "event.deleted": "Event deleted",
  "error.unsupported_language": "Unsupported language: {lang}"
}
"#;

fn parse_table(lang: &str, raw: &str) -> HashMap<String, String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::error!("failed to parse {} translations: {}", lang, e);
        HashMap::new()
    })
}

/// Initialize translations map (lazy).
fn build_translations() -> HashMap<String, HashMap<String, String>> {
    let mut out: HashMap<String, HashMap<String, String>> = HashMap::new();
    out.insert("pt".to_string(), parse_table("pt", PT_JSON));
    out.insert("en".to_string(), parse_table("en", EN_JSON));
    out
}

/// Returns the global translations map (lang -> (key -> message)).
fn translations() -> &'static HashMap<String, HashMap<String, String>> {
    TRANSLATIONS.get_or_init(build_translations)
}

/// Normalize a language tag into a short, lowercase code (e.g. "pt-BR" -> "pt").
pub fn normalize_language(lang: &str) -> String {
    lang.split('-').next().unwrap_or(lang).trim().to_lowercase()
}

/// Returns true if the given language code is supported (e.g. "pt", "en").
pub fn is_supported_language(lang: &str) -> bool {
    translations().contains_key(lang)
}

/// Translate a key using an explicit language (or default if None).
///
/// Placeholders `{name}` are replaced from `params`. Missing keys fall back to
/// the default language, then to the key itself.
pub fn tr(lang: Option<&str>, key: &str, params: Option<&[(&str, &str)]>) -> String {
    let map = translations();

    let desired = lang.unwrap_or(DEFAULT_LANG);

    let val = map
        .get(desired)
        .and_then(|m| m.get(key))
        .cloned()
        .or_else(|| map.get(DEFAULT_LANG).and_then(|m| m.get(key)).cloned())
        .unwrap_or_else(|| key.to_string());

    if let Some(params) = params {
        let mut s = val;
        for (k, v) in params {
            s = s.replace(&format!("{{{}}}", k), v);
        }
        s
    } else {
        val
    }
}

/// Convenience wrapper: translate using default language (DEFAULT_LANG).
pub fn t(key: &str) -> String {
    tr(None, key, None)
}

/// Convenience wrapper with params (default language).
pub fn t_with(key: &str, params: &[(&str, &str)]) -> String {
    tr(None, key, Some(params))
}
