//! Per-language keyword lists shared by the parsers (spec §4.5). Kept as a
//! single small table rather than a config file — the set is fixed and
//! closed (en/es/pt), matching the language-detection closed set.

use super::Language;

/// Function words whose presence is a strong signal for language detection.
pub const EN_MARKERS: &[&str] = &["the", "and", "to", "is", "buy", "tomorrow", "today", "please", "for"];
pub const ES_MARKERS: &[&str] = &["el", "la", "de", "que", "vence", "pagar", "mañana", "hoy", "por", "para"];
pub const PT_MARKERS: &[&str] = &["o", "a", "de", "que", "vence", "pagar", "amanhã", "hoje", "para", "conta"];

/// Leading tokens that mark a message as a task, stripped before taking the
/// title (spec §4.5 task parser: "strip leading task-indicator tokens").
pub fn task_indicators(lang: Language) -> &'static [&'static str] {
    match lang {
        Language::En => &["task:", "todo:", "to-do:", "reminder:"],
        Language::Es => &["tarea:", "pendiente:", "recordatorio:"],
        Language::Pt => &["tarefa:", "pendência:", "lembrete:"],
    }
}

pub fn priority_keywords(lang: Language) -> &'static [(&'static str, &'static str)] {
    match lang {
        Language::En => &[
            ("urgent", "high"),
            ("asap", "high"),
            ("high priority", "high"),
            ("important", "high"),
            ("low priority", "low"),
            ("whenever", "low"),
            ("no rush", "low"),
        ],
        Language::Es => &[
            ("urgente", "high"),
            ("importante", "high"),
            ("alta prioridad", "high"),
            ("baja prioridad", "low"),
            ("cuando puedas", "low"),
        ],
        Language::Pt => &[
            ("urgente", "high"),
            ("importante", "high"),
            ("alta prioridade", "high"),
            ("baixa prioridade", "low"),
            ("quando puder", "low"),
        ],
    }
}

/// Keywords that signal a calendar event is a video call (spec §4.5
/// calendar parser: "detected keywords like videocall keywords produce a
/// sentinel").
pub const VIDEOCALL_SENTINEL: &str = "__videocall__";

pub fn videocall_keywords(lang: Language) -> &'static [&'static str] {
    match lang {
        Language::En => &["video call", "videocall", "zoom", "meet", "virtual"],
        Language::Es => &["videollamada", "video llamada", "virtual", "zoom"],
        Language::Pt => &["videochamada", "video chamada", "virtual", "zoom"],
    }
}

pub fn recurrence_keywords(lang: Language) -> &'static [(&'static str, &'static str)] {
    match lang {
        Language::En => &[("every day", "daily"), ("daily", "daily"), ("every week", "weekly"), ("weekly", "weekly"), ("every month", "monthly"), ("monthly", "monthly")],
        Language::Es => &[("cada día", "daily"), ("diario", "daily"), ("cada semana", "weekly"), ("semanal", "weekly"), ("cada mes", "monthly"), ("mensual", "monthly")],
        Language::Pt => &[("todo dia", "daily"), ("diário", "daily"), ("toda semana", "weekly"), ("semanal", "weekly"), ("todo mês", "monthly"), ("mensal", "monthly")],
    }
}

pub fn bill_category_keywords(lang: Language) -> &'static [(&'static str, &'static str)] {
    match lang {
        Language::En => &[
            ("electric", "utilities"), ("power", "utilities"), ("water", "utilities"),
            ("internet", "utilities"), ("phone", "utilities"), ("rent", "housing"),
            ("insurance", "insurance"), ("subscription", "subscription"),
        ],
        Language::Es => &[
            ("luz", "utilities"), ("cfe", "utilities"), ("agua", "utilities"),
            ("internet", "utilities"), ("renta", "housing"), ("seguro", "insurance"),
            ("suscripción", "subscription"),
        ],
        Language::Pt => &[
            ("luz", "utilities"), ("água", "utilities"), ("internet", "utilities"),
            ("aluguel", "housing"), ("seguro", "insurance"), ("assinatura", "subscription"),
        ],
    }
}

/// Currency symbol/code -> ISO 4217 code.
pub const CURRENCY_SYMBOLS: &[(&str, &str)] = &[("$", "USD"), ("€", "EUR"), ("£", "GBP"), ("R$", "BRL")];
