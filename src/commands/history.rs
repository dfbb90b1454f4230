use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::error::Result;
use crate::history::HistoryPage;
use crate::session::{MessagesPage, SessionStore};
use crate::storage::Role;
use colored::Colorize;
use prettytable::{format, Table};

const PREVIEW_CHARS: usize = 60;

/// Handle history commands
pub async fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let store = SessionStore::from_config(&config.storage, false)?;

    match command {
        HistoryCommand::List { user, page } => {
            let history = store
                .list_history(user.as_deref(), page, config.server.history_page_size)
                .await?;
            print_history(&history);
        }
        HistoryCommand::Show { session_id, page } => {
            let messages = store
                .get_session_messages_page(
                    &session_id,
                    page,
                    config.server.session_message_page_size,
                )
                .await?;
            print_messages(&session_id, &messages);
        }
    }

    Ok(())
}

fn print_history(history: &HistoryPage) {
    if history.data.is_empty() {
        println!("{}", "No chat history found.".yellow());
        return;
    }

    for group in &history.data.groups {
        println!("\n{}", group.date.bold());

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
        table.add_row(prettytable::row![
            "Session".bold(),
            "Title".bold(),
            "Last Updated".bold()
        ]);

        for item in &group.items {
            let updated = item.last_updated.format("%H:%M").to_string();
            table.add_row(prettytable::row![
                item.session_id.cyan(),
                item.title,
                updated
            ]);
        }
        table.printstd();
    }

    println!(
        "\nPage {} of {} ({} dates)",
        history.current_page, history.total_pages, history.total_items
    );
    println!(
        "Use {} to read a session.",
        "streamforge history show <SESSION>".cyan()
    );
    println!();
}

fn print_messages(session_id: &str, page: &MessagesPage) {
    println!(
        "\nSession {} ({} messages, page {} of {})",
        session_id.cyan(),
        page.total_messages,
        page.current_page,
        page.total_pages
    );

    if page.messages.is_empty() {
        println!("{}", "No messages in this session.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row!["Role".bold(), "Message".bold()]);

    for message in &page.messages {
        let role = match message.role {
            Role::User => "user".green(),
            Role::Bot => "bot".blue(),
        };
        table.add_row(prettytable::row![role, preview(&message.content)]);
    }
    table.printstd();
    println!();
}

fn preview(content: &str) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() > PREVIEW_CHARS {
        let cut: String = flat.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_flattens_and_truncates() {
        assert_eq!(preview("a\nb"), "a b");
        let long = "x".repeat(100);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn test_preview_counts_chars_not_bytes() {
        let text = "é".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&text), text);
    }
}
