use super::ui;
use crate::core::session::UserId;
use crate::store::{Subscriber, SubscriberStore};
use anyhow::Result;
use comfy_table::Cell;

pub fn display_subscribers(subscribers: &[Subscriber]) -> String {
    if subscribers.is_empty() {
        return "No subscribers yet.".to_string();
    }
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("User"),
        ui::header_cell("Status"),
        ui::header_cell("Joined"),
    ]);
    for subscriber in subscribers {
        let status = if subscriber.active {
            Cell::new("active")
        } else {
            Cell::new("inactive").fg(comfy_table::Color::DarkGrey)
        };
        table.add_row(vec![
            ui::amount_cell(subscriber.user_id.to_string()),
            status,
            Cell::new(subscriber.joined_at.format("%Y-%m-%d %H:%M UTC").to_string()),
        ]);
    }
    let active = subscribers.iter().filter(|s| s.active).count();
    format!(
        "{}\n{} {}",
        table,
        ui::style_text("Active:", ui::StyleType::Label),
        ui::style_text(&active.to_string(), ui::StyleType::Value)
    )
}

pub async fn subscribe(store: &dyn SubscriberStore, user: UserId) -> Result<()> {
    if store.subscribe(user).await? {
        println!("Subscribed {user} to the daily digest");
    } else {
        println!(
            "{}",
            ui::style_text(&format!("{user} is already subscribed"), ui::StyleType::Warning)
        );
    }
    Ok(())
}

pub async fn unsubscribe(store: &dyn SubscriberStore, user: UserId) -> Result<()> {
    if store.unsubscribe(user).await? {
        println!("Unsubscribed {user} from the daily digest");
    } else {
        println!(
            "{}",
            ui::style_text(&format!("{user} is not subscribed"), ui::StyleType::Warning)
        );
    }
    Ok(())
}

pub async fn list(store: &dyn SubscriberStore) -> Result<()> {
    println!("{}", display_subscribers(&store.list().await?));
    Ok(())
}
