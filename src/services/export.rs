use crate::models::{Conversation, Role};

pub fn export_to_markdown(conversation: &Conversation) -> String {
    let mut output = format!("# {}\n\n", conversation.title);
    output.push_str(&format!(
        "> Date: {} | Messages: {}\n\n",
        conversation.created_at.format("%Y-%m-%d %H:%M"),
        conversation.message_count()
    ));
    output.push_str("---\n\n");

    for msg in &conversation.messages {
        let role_label = match msg.role {
            Role::User => "You",
            Role::Assistant => "Mentor",
            Role::System => "System",
        };
        output.push_str(&format!(
            "### {} ({})\n\n{}\n\n",
            role_label,
            msg.created_at.format("%H:%M"),
            msg.content
        ));
    }

    output
}
