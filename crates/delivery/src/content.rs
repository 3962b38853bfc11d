//! Payload → outbound content rendering.
//!
//! A job expands into one or more provider sends: a lesson is its body,
//! then its media attachment, then its quiz as quick-reply buttons.

use {
    lernio_channels::{ButtonOption, OutboundContent},
    lernio_queue::JobPayload,
};

/// Render the content items a job delivers, in send order.
#[must_use]
pub fn render(payload: &JobPayload) -> Vec<OutboundContent> {
    match payload {
        JobPayload::Lesson {
            title,
            body,
            media_url,
            quiz,
            ..
        } => {
            let mut items = vec![OutboundContent::Text {
                body: format!("*{title}*\n\n{body}"),
            }];
            if let Some(url) = media_url {
                items.push(OutboundContent::Media {
                    url: url.clone(),
                    caption: Some(title.clone()),
                });
            }
            if let Some(quiz) = quiz {
                items.push(OutboundContent::Buttons {
                    body: quiz.question.clone(),
                    options: quiz
                        .options
                        .iter()
                        .map(|o| ButtonOption {
                            id: o.id.clone(),
                            label: o.label.clone(),
                        })
                        .collect(),
                });
            }
            items
        },
        JobPayload::Welcome {
            display_name,
            body,
            ..
        } => vec![OutboundContent::Text {
            body: format!("Welcome, {display_name}!\n\n{body}"),
        }],
        JobPayload::Reminder { body, .. }
        | JobPayload::Notification { body, .. }
        | JobPayload::Text { body, .. } => vec![OutboundContent::Text { body: body.clone() }],
    }
}

/// A short log-friendly body for the message record of one content item.
#[must_use]
pub fn record_body(item: &OutboundContent) -> String {
    match item {
        OutboundContent::Text { body } => body.clone(),
        OutboundContent::Media { url, .. } => format!("[media] {url}"),
        OutboundContent::Buttons { body, .. } => body.clone(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        lernio_queue::{LessonQuiz, QuizOption},
    };

    #[test]
    fn test_plain_lesson_is_one_text_item() {
        let payload = JobPayload::Lesson {
            course_id: "C1".into(),
            lesson_id: "L1".into(),
            recipient: "+1".into(),
            title: "Intro".into(),
            body: "Hello".into(),
            media_url: None,
            quiz: None,
        };
        let items = render(&payload);
        assert_eq!(items, vec![OutboundContent::Text {
            body: "*Intro*\n\nHello".into()
        }]);
    }

    #[test]
    fn test_full_lesson_renders_text_media_quiz_in_order() {
        let payload = JobPayload::Lesson {
            course_id: "C1".into(),
            lesson_id: "L1".into(),
            recipient: "+1".into(),
            title: "Intro".into(),
            body: "Hello".into(),
            media_url: Some("https://cdn.example/l1.png".into()),
            quiz: Some(LessonQuiz {
                question: "2+2?".into(),
                options: vec![
                    QuizOption {
                        id: "a".into(),
                        label: "3".into(),
                    },
                    QuizOption {
                        id: "b".into(),
                        label: "4".into(),
                    },
                ],
                correct_option_id: "b".into(),
            }),
        };

        let items = render(&payload);
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], OutboundContent::Text { .. }));
        assert!(matches!(items[1], OutboundContent::Media { .. }));
        match &items[2] {
            OutboundContent::Buttons { body, options } => {
                assert_eq!(body, "2+2?");
                assert_eq!(options.len(), 2);
            },
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn test_welcome_includes_display_name() {
        let payload = JobPayload::Welcome {
            display_name: "Ada".into(),
            recipient: "+1".into(),
            body: "Your course starts tomorrow.".into(),
        };
        match &render(&payload)[0] {
            OutboundContent::Text { body } => {
                assert!(body.starts_with("Welcome, Ada!"));
            },
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn test_text_passthrough() {
        let payload = JobPayload::Text {
            recipient: "+1".into(),
            body: "ack".into(),
        };
        assert_eq!(render(&payload), vec![OutboundContent::Text {
            body: "ack".into()
        }]);
    }
}
