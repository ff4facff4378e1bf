//! User-facing text: sizes, durations, progress bars and localized phrases.
//!
//! Every string the orchestrator pushes into a chat is built here, so the
//! rest of the crate stays free of presentation concerns. Two locales are
//! supported; unknown locales fall back to Russian like the rest of the bot.

use crate::gate::DenyReason;
use crate::progress::{ProgressEvent, ProgressStage};

/// Chat platform caption length limit.
pub const CAPTION_LIMIT: usize = 1024;

const BAR_WIDTH: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    En,
    #[default]
    Ru,
}

impl Locale {
    /// Map a platform language code ("en", "en-US", "ru", ...) to a locale.
    pub fn from_code(code: &str) -> Self {
        if code.starts_with("en") {
            Locale::En
        } else {
            Locale::Ru
        }
    }
}

/// "1.5 MB" style size, "?" when unknown.
pub fn human_size(bytes: Option<u64>) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let Some(b) = bytes else {
        return "?".to_string();
    };
    let mut size = b as f64;
    for (i, unit) in UNITS.iter().enumerate() {
        if size < 1024.0 || i == UNITS.len() - 1 {
            let val = format!("{size:.1}");
            let val = val.trim_end_matches('0').trim_end_matches('.');
            return format!("{val} {unit}");
        }
        size /= 1024.0;
    }
    format!("{b} B")
}

/// Transfer rate rendered like a size; "?" when the engine measured none.
pub fn human_rate(bytes_per_sec: Option<f64>) -> String {
    match bytes_per_sec {
        Some(r) if r >= 0.0 => human_size(Some(r as u64)),
        _ => "?".to_string(),
    }
}

/// "MM:SS" or "HH:MM:SS", "?" when unknown.
pub fn human_duration(secs: Option<u64>) -> String {
    let Some(total) = secs else {
        return "?".to_string();
    };
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

/// Fixed-width bar of filled/empty blocks for a clamped percentage.
pub fn progress_bar(pct: f64) -> String {
    let pct = pct.clamp(0.0, 100.0);
    let filled = (BAR_WIDTH as f64 * pct / 100.0).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("{}{}", "▰".repeat(filled), "▱".repeat(BAR_WIDTH - filled))
}

/// Truncate a probed title to the platform caption limit.
pub fn caption_from_title(title: &str) -> String {
    title.chars().take(CAPTION_LIMIT).collect()
}

/// Acknowledgment for a request that entered the queue, with a hint about
/// how busy the bot is when other jobs are running.
pub fn queued(locale: Locale, active_jobs: usize) -> String {
    let hint = match (locale, active_jobs) {
        (_, 0) => String::new(),
        (Locale::En, n) => format!(" · {n} in progress"),
        (Locale::Ru, n) => format!(" · в обработке {n}"),
    };
    match locale {
        Locale::En => format!("⏳ Queued{hint}…"),
        Locale::Ru => format!("⏳ В очереди{hint}…"),
    }
}

pub fn preparing(locale: Locale) -> String {
    match locale {
        Locale::En => "⏳ Preparing download…".to_string(),
        Locale::Ru => "⏳ Готовлю загрузку…".to_string(),
    }
}

/// Status-message text for one progress event.
pub fn progress_text(locale: Locale, event: &ProgressEvent) -> String {
    match event.stage {
        ProgressStage::Preparing => preparing(locale),
        ProgressStage::Downloading => {
            let pct = event.percent().unwrap_or(0.0);
            let bar = progress_bar(pct);
            let size = human_size(Some(event.bytes_done));
            let total = human_size(event.bytes_total);
            let speed = human_rate(event.rate);
            let eta = human_duration(event.eta_secs);
            match locale {
                Locale::En => format!(
                    "⏬ Downloading {pct:.0}%  {bar}\n{size}/{total} • {speed}/s • ETA {eta}"
                ),
                Locale::Ru => format!(
                    "⏬ Скачивание {pct:.0}%  {bar}\n{size}/{total} • {speed}/с • ETA {eta}"
                ),
            }
        }
        ProgressStage::Uploading => {
            let pct = event.percent().unwrap_or(0.0);
            let bar = progress_bar(pct);
            match locale {
                Locale::En => format!("⏫ Uploading large file {pct:.0}%  {bar}"),
                Locale::Ru => format!("⏫ Загрузка большого файла {pct:.0}%  {bar}"),
            }
        }
        ProgressStage::Finished => match locale {
            Locale::En => "✅ Downloaded. Processing…".to_string(),
            Locale::Ru => "✅ Скачано. Обработка…".to_string(),
        },
    }
}

pub fn delivered(locale: Locale) -> String {
    match locale {
        Locale::En => "✅ Done!".to_string(),
        Locale::Ru => "✅ Готово!".to_string(),
    }
}

/// Oversized-file fallback: caption and link under the phrase line. An
/// empty caption drops its line.
pub fn direct_link(locale: Locale, caption: &str, url: &str) -> String {
    let body = if caption.is_empty() {
        String::new()
    } else {
        format!("{caption}\n")
    };
    match locale {
        Locale::En => format!("File is large. Download via link:\n\n{body}{url}"),
        Locale::Ru => format!("Файл большой. Можно скачать по ссылке:\n\n{body}{url}"),
    }
}

pub fn failure(locale: Locale) -> String {
    match locale {
        Locale::En => "Error while downloading. Try another link.".to_string(),
        Locale::Ru => "Произошла ошибка при скачивании. Попробуйте другую ссылку.".to_string(),
    }
}

pub fn probe_failed(locale: Locale) -> String {
    match locale {
        Locale::En => "Failed to get formats. Check the link.".to_string(),
        Locale::Ru => "Не удалось получить информацию о форматах. Проверьте ссылку.".to_string(),
    }
}

pub fn selection_expired(locale: Locale) -> String {
    match locale {
        Locale::En => "Selection expired. Send the link again.".to_string(),
        Locale::Ru => "Выбор устарел. Отправьте ссылку ещё раз.".to_string(),
    }
}

/// Immediate reply for a request the rate gate turned away.
pub fn deny_text(locale: Locale, reason: &DenyReason) -> String {
    match (locale, reason) {
        (Locale::En, DenyReason::Cooldown { remaining_secs }) => {
            format!("Too many requests. Wait {remaining_secs}s.")
        }
        (Locale::Ru, DenyReason::Cooldown { remaining_secs }) => {
            format!("Слишком много запросов. Подождите {remaining_secs} с.")
        }
        (Locale::En, DenyReason::ScopeBusy) => {
            "Too many active downloads in this chat. Try again soon.".to_string()
        }
        (Locale::Ru, DenyReason::ScopeBusy) => {
            "В этом чате слишком много активных загрузок. Попробуйте позже.".to_string()
        }
        (Locale::En, DenyReason::GlobalBusy) => {
            "The bot is at capacity right now. Try again soon.".to_string()
        }
        (Locale::Ru, DenyReason::GlobalBusy) => {
            "Бот сейчас перегружен. Попробуйте позже.".to_string()
        }
    }
}
