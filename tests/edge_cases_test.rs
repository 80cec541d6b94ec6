//! Edge case tests for message, attachment, and thread handling.

use embed_agent_runtime::{Attachment, Message, Thread};

#[test]
fn empty_thread_has_no_messages() {
    let thread = Thread::new(None);
    assert_eq!(thread.messages.len(), 0);
    assert!(thread.title.is_none());
}

#[test]
fn message_with_empty_content_serializes_to_empty_string_not_null() {
    let msg = Message::user("");
    let wire = msg.to_wire();
    assert_eq!(wire["content"], serde_json::json!(""));
}

#[test]
fn many_attachments_on_one_message_preserve_count_and_order() {
    let mut msg = Message::user("compare these");
    for i in 0..15 {
        msg = msg.with_attachment(
            Attachment::from_base64("QQ==", "image/png").with_filename(format!("{i}.png")),
        );
    }

    assert_eq!(msg.metadata.attachments.len(), 15);
    let wire = msg.to_wire();
    let parts = wire["content"].as_array().unwrap();
    // 1 text part + 15 image parts
    assert_eq!(parts.len(), 16);
    for (i, part) in parts.iter().skip(1).enumerate() {
        assert_eq!(part["type"], "image_url");
        let _ = i;
    }
}

#[test]
fn attachment_only_message_with_empty_text_omits_the_text_part() {
    let msg = Message::user("").with_attachment(Attachment::from_base64("QQ==", "image/png"));
    let wire = msg.to_wire();
    let parts = wire["content"].as_array().unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0]["type"], "image_url");
}

#[test]
fn various_mime_types_round_trip_through_the_content_part() {
    for mime in ["image/jpeg", "image/png", "image/gif", "image/webp", "image/avif"] {
        let attachment = Attachment::from_base64("QQ==", mime);
        let part = attachment.to_content_part();
        assert!(part["image_url"]["url"].as_str().unwrap().starts_with(&format!("data:{mime};base64,")));
    }
}

#[test]
fn large_base64_payload_is_carried_without_truncation() {
    let large = "A".repeat(10_000);
    let attachment = Attachment::from_base64(&large, "image/png");
    let part = attachment.to_content_part();
    let url = part["image_url"]["url"].as_str().unwrap();
    assert!(url.len() > 10_000);
    assert!(url.ends_with(&large));
}

#[test]
fn unicode_text_survives_wire_round_trip() {
    let msg = Message::user("こんにちは 🌸 مرحبا 🎨");
    let wire = msg.to_wire();
    assert_eq!(wire["content"], serde_json::json!("こんにちは 🌸 مرحبا 🎨"));
}

#[test]
fn derive_title_on_short_content_keeps_it_as_is() {
    assert_eq!(Thread::derive_title("hi"), "hi");
}

#[test]
fn derive_title_on_content_with_no_whitespace_hard_cuts() {
    let long = "a".repeat(100);
    let title = Thread::derive_title(&long);
    assert!(title.ends_with('…'));
    assert!(title.chars().count() <= 62);
}

#[test]
fn derive_title_trims_surrounding_whitespace() {
    assert_eq!(Thread::derive_title("   hello world   "), "hello world");
}

#[test]
fn filename_and_detail_builder_methods_compose() {
    let attachment = Attachment::from_base64("QQ==", "image/png")
        .with_filename("screenshot.png")
        .with_detail(embed_agent_runtime::ImageDetail::Low);

    assert_eq!(attachment.filename.as_deref(), Some("screenshot.png"));
    assert_eq!(attachment.detail, Some(embed_agent_runtime::ImageDetail::Low));
}
