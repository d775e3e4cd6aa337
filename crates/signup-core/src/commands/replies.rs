//! User-facing reply texts (Russian, as the signup sheet's chat expects).

use crate::persistence::ReservationRecord;

use super::parser::CommandError;

pub const BOT_ASLEEP: &str = "Бот спит";
pub const NO_RESERVATIONS: &str = "Записей нет";
pub const NO_USERNAME: &str =
    "Чтобы пользоваться записью, задайте имя пользователя (username) в настройках Telegram";
pub const STORAGE_FAILURE: &str = "Не удалось сохранить изменения, попробуйте ещё раз";

pub fn signed_up(username: &str, date: &str, num_participants: u32) -> String {
    format!("@{username} записан на {date}, {num_participants} человек")
}

pub fn date_unavailable(date: &str, available: &[String]) -> String {
    format!(
        "дата {date} не доступна, доступные даты: {}",
        available.join(", ")
    )
}

pub fn cancelled(username: &str, date: &str) -> String {
    format!("Бронь @{username} на {date} отменена")
}

pub fn nothing_to_cancel(username: &str, date: &str) -> String {
    format!("У @{username} нет брони на {date}")
}

/// `/checkme` listing: one `date: count` line per reservation.
pub fn my_reservations(records: &[ReservationRecord]) -> String {
    if records.is_empty() {
        return NO_RESERVATIONS.to_string();
    }
    records
        .iter()
        .map(|r| format!("{}: {}", r.date, r.num_participants))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `/checkdate` listing: one `@user: count` line per reservation.
pub fn date_reservations(records: &[ReservationRecord]) -> String {
    if records.is_empty() {
        return NO_RESERVATIONS.to_string();
    }
    records
        .iter()
        .map(|r| format!("@{}: {}", r.username, r.num_participants))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn invalid_command(error: &CommandError) -> String {
    match error {
        CommandError::MissingDate { command: "signup" } => {
            "Использование: /signup <дата> [количество человек]".to_string()
        }
        CommandError::MissingDate { command } => format!("Использование: /{command} <дата>"),
        CommandError::InvalidParticipants(raw) => {
            format!("Количество человек должно быть положительным числом, а не «{raw}»")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(username: &str, date: &str, n: u32) -> ReservationRecord {
        ReservationRecord::new(username, date, n)
    }

    #[test]
    fn signup_reply_mentions_user_date_and_count() {
        assert_eq!(signed_up("bob", "12.8", 2), "@bob записан на 12.8, 2 человек");
    }

    #[test]
    fn unavailable_date_lists_choices() {
        let dates = vec!["12.8".to_string(), "19.8".to_string()];
        assert_eq!(
            date_unavailable("1.9", &dates),
            "дата 1.9 не доступна, доступные даты: 12.8, 19.8"
        );
    }

    #[test]
    fn listings_render_one_line_per_record() {
        let records = vec![record("bob", "12.8", 2), record("ann", "12.8", 1)];

        assert_eq!(my_reservations(&records), "12.8: 2\n12.8: 1");
        assert_eq!(date_reservations(&records), "@bob: 2\n@ann: 1");
    }

    #[test]
    fn empty_listings_say_so() {
        assert_eq!(my_reservations(&[]), NO_RESERVATIONS);
        assert_eq!(date_reservations(&[]), NO_RESERVATIONS);
    }

    #[test]
    fn usage_depends_on_command() {
        assert!(invalid_command(&CommandError::MissingDate { command: "signup" })
            .contains("[количество человек]"));
        assert_eq!(
            invalid_command(&CommandError::MissingDate { command: "cancel" }),
            "Использование: /cancel <дата>"
        );
    }
}
