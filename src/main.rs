mod api;
mod attachments;
mod config;
mod format;
mod kb;
mod status;
mod store;

use iced::{
    alignment, clipboard, time,
    widget::{
        button, column, container, image, pick_list, row, scrollable, stack, text, text_editor,
        text_input, text_input::Id, Space,
    },
    window, Element, Font, Length, Padding, Subscription, Task, Theme,
};
use std::time::Duration;

use api::{ApiClient, ApiError};
use attachments::{AttachmentError, ImageAttachment, PendingImages};
use format::Block;
use kb::{KnowledgeBase, Registry};
use store::{ChatMessage, ConversationStore, Sender};

const LOADING_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const LANGUAGES: &[&str] = &[
    "python",
    "rust",
    "javascript",
    "typescript",
    "go",
    "java",
    "cpp",
    "sql",
    "bash",
    "other",
];

fn main() -> iced::Result {
    let config = config::Config::load();

    iced::application("RAG Desk", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size: iced::Size::new(config.window.width as f32, config.window.height as f32),
            min_size: Some(iced::Size::new(
                config.window.min_width as f32,
                config.window.min_height as f32,
            )),
            position: window::Position::Centered,
            ..Default::default()
        })
        .default_font(Font::MONOSPACE)
        .run_with(App::new)
}

#[derive(Debug, Clone)]
enum Message {
    KnowledgeBasesLoaded(Result<Vec<KnowledgeBase>, ApiError>),
    KbSelected(String),
    QuestionChanged(String),
    CodeEdited(text_editor::Action),
    LanguageSelected(&'static str),
    ClearCode,
    PasteCode,
    CodePasted(Option<String>),
    AttachImages,
    ImagesLoaded(Vec<Result<ImageAttachment, AttachmentError>>),
    RemoveImage(usize),
    Submit,
    ResponseReceived(Result<String, ApiError>),
    ClearChat,
    HistoryCleared(Result<(), ApiError>),
    CopyText(String),
    Tick,
}

struct App {
    api: ApiClient,
    registry: Registry,
    store: ConversationStore,
    pending_images: PendingImages,
    question: String,
    code: text_editor::Content,
    language: &'static str,
    is_loading: bool,
    loading_frame: usize,
    busy_message: String,
    load_error: Option<String>,
    input_id: Id,
}

impl App {
    fn new() -> (Self, Task<Message>) {
        Self::with_config(config::Config::load())
    }

    fn with_config(config: config::Config) -> (Self, Task<Message>) {
        let api = ApiClient::new(
            &config.backend.base_url,
            Duration::from_secs(config.backend.timeout_secs),
        );

        let input_id = Id::unique();

        let app = App {
            api: api.clone(),
            registry: Registry::default(),
            store: ConversationStore::default(),
            pending_images: PendingImages::default(),
            question: String::new(),
            code: text_editor::Content::new(),
            language: LANGUAGES[0],
            is_loading: true,
            loading_frame: 0,
            busy_message: "Loading knowledge bases...".to_string(),
            load_error: None,
            input_id: input_id.clone(),
        };

        let load_task = Task::perform(
            async move { api.list_knowledge_bases().await },
            Message::KnowledgeBasesLoaded,
        );
        let focus_task = text_input::focus(input_id);

        (app, Task::batch([load_task, focus_task]))
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::KnowledgeBasesLoaded(result) => {
                self.is_loading = false;
                match result {
                    Ok(entries) => {
                        self.load_error = None;
                        if let Some(current) = self.registry.set_entries(entries).cloned() {
                            self.enter_conversation(&current);
                        }
                    }
                    Err(e) => {
                        status::log_with(
                            status::Kind::Warn,
                            format!("Failed to load knowledge bases: {}", e),
                        );
                        self.load_error = Some(format!("Failed to load knowledge bases: {}", e));
                    }
                }
                Task::none()
            }
            Message::KbSelected(id) => {
                if let Some(current) = self.registry.select(&id).cloned() {
                    self.enter_conversation(&current);
                }
                Task::none()
            }
            Message::QuestionChanged(value) => {
                self.question = value;
                Task::none()
            }
            Message::CodeEdited(action) => {
                self.code.perform(action);
                Task::none()
            }
            Message::LanguageSelected(language) => {
                self.language = language;
                Task::none()
            }
            Message::ClearCode => {
                self.code = text_editor::Content::new();
                Task::none()
            }
            Message::PasteCode => clipboard::read().map(Message::CodePasted),
            Message::CodePasted(contents) => {
                match contents {
                    Some(code) if !code.is_empty() => {
                        self.code = text_editor::Content::with_text(&code);
                    }
                    _ => status::log("Clipboard is empty or unavailable; paste manually."),
                }
                Task::none()
            }
            Message::AttachImages => Task::perform(pick_images(), Message::ImagesLoaded),
            Message::ImagesLoaded(results) => {
                for result in results {
                    let added = result.and_then(|attachment| {
                        let name = attachment.filename.clone();
                        self.pending_images.add(attachment).map(|_| name)
                    });
                    match added {
                        Ok(name) => status::log(format!("Attached {}", name)),
                        Err(e) => status::log_with(
                            status::Kind::Warn,
                            format!("Skipped attachment: {}", e),
                        ),
                    }
                }
                Task::none()
            }
            Message::RemoveImage(index) => {
                self.pending_images.remove(index);
                Task::none()
            }
            Message::Submit => {
                if !self.can_send() {
                    return Task::none();
                }
                let Some(current) = self.registry.current().cloned() else {
                    return Task::none();
                };

                let question = self.question.trim().to_string();
                let images = self.pending_images.drain();

                self.store
                    .append(&current.id, ChatMessage::user(question.clone(), images.clone()));
                self.question.clear();

                self.is_loading = true;
                self.busy_message = format!("Querying {}...", current.name);
                status::log(self.busy_message.clone());

                let api = self.api.clone();
                if current.is_code_review() {
                    let code = self.code.text();
                    Task::perform(
                        async move { api.review_code(&code, &question, &images).await },
                        Message::ResponseReceived,
                    )
                } else {
                    Task::perform(
                        async move { api.query(&current.id, &question, &images).await },
                        Message::ResponseReceived,
                    )
                }
            }
            Message::ResponseReceived(result) => {
                self.is_loading = false;
                let reply = match result {
                    Ok(answer) => ChatMessage::assistant(answer),
                    Err(e) if e.is_index_building() => ChatMessage::assistant(
                        "🔄 The knowledge base is still being built. \
                         Please wait a few minutes and try again.",
                    ),
                    Err(e) => ChatMessage::assistant(format!("❌ Error: {}", e)),
                };
                // A reply landing after a switch goes to the now-current
                // conversation; in-flight requests are not cancelled.
                if let Some(current) = self.registry.current() {
                    let id = current.id.clone();
                    self.store.append(&id, reply);
                }
                Task::none()
            }
            Message::ClearChat => {
                let Some(current) = self.registry.current().cloned() else {
                    return Task::none();
                };

                self.store.clear(&current.id);
                self.pending_images.clear();
                self.enter_conversation(&current);

                if current.is_code_review() {
                    Task::none()
                } else {
                    let api = self.api.clone();
                    Task::perform(
                        async move { api.clear_history(&current.id).await },
                        Message::HistoryCleared,
                    )
                }
            }
            Message::HistoryCleared(result) => {
                if let Err(e) = result {
                    status::log_with(
                        status::Kind::Warn,
                        format!("Failed to clear server history: {}", e),
                    );
                }
                Task::none()
            }
            Message::CopyText(contents) => clipboard::write(contents),
            Message::Tick => {
                if self.is_loading {
                    self.loading_frame = self.loading_frame.wrapping_add(1);
                }
                Task::none()
            }
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        if self.is_loading {
            time::every(Duration::from_millis(100)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        }
    }

    /// Seed the welcome message when a conversation starts empty; stored
    /// messages replay untouched otherwise.
    fn enter_conversation(&mut self, current: &KnowledgeBase) {
        if self.store.is_empty(&current.id) {
            self.store
                .append(&current.id, ChatMessage::assistant(current.welcome_message()));
        }
    }

    fn can_send(&self) -> bool {
        let Some(current) = self.registry.current() else {
            return false;
        };
        if self.is_loading {
            return false;
        }

        let has_question = !self.question.trim().is_empty();
        let has_images = !self.pending_images.is_empty();
        let has_code = !current.is_code_review() || !self.code.text().trim().is_empty();

        (has_question || has_images) && has_code
    }

    fn view(&self) -> Element<Message> {
        let mut content = column![self.kb_selector(), self.chat_header()]
            .spacing(10)
            .padding(10);

        if let Some(current) = self.registry.current() {
            if current.is_code_review() {
                content = content.push(self.review_panel());
            }
        }

        content = content.push(self.chat_area()).push(self.composer());

        let base = container(content).width(Length::Fill).height(Length::Fill);

        if self.is_loading {
            stack(vec![base.into(), self.busy_overlay()]).into()
        } else {
            base.into()
        }
    }

    fn kb_selector(&self) -> Element<Message> {
        let mut bar = row![].spacing(8);

        for entry in self.registry.entries() {
            let label = if entry.available {
                format!("{} {}", entry.icon, entry.name)
            } else {
                format!("{} {} ❌", entry.icon, entry.name)
            };
            let is_current = self
                .registry
                .current()
                .map(|current| current.id == entry.id)
                .unwrap_or(false);

            let mut kb_button = button(text(label).size(14)).padding(8);
            if entry.available && !is_current {
                kb_button = kb_button.on_press(Message::KbSelected(entry.id.clone()));
            }
            kb_button = kb_button.style(if is_current {
                button::primary
            } else {
                button::secondary
            });

            bar = bar.push(kb_button);
        }

        bar.width(Length::Fill).into()
    }

    fn chat_header(&self) -> Element<Message> {
        let Some(current) = self.registry.current() else {
            return Space::with_height(Length::Shrink).into();
        };

        let mut header = row![text(format!("💬 {}", current.name)).size(17)]
            .spacing(10)
            .align_y(alignment::Vertical::Center);
        if current.supports_images {
            header = header.push(text("📷 Images supported").size(12));
        }

        header.into()
    }

    fn review_panel(&self) -> Element<Message> {
        let header = row![
            text("Code to review").size(14),
            Space::with_width(Length::Fill),
            pick_list(LANGUAGES, Some(self.language), Message::LanguageSelected),
            button(text("Paste").size(14))
                .padding(6)
                .on_press(Message::PasteCode),
            button(text("Clear").size(14))
                .padding(6)
                .style(button::secondary)
                .on_press(Message::ClearCode),
        ]
        .spacing(8)
        .align_y(alignment::Vertical::Center);

        let editor = text_editor(&self.code)
            .placeholder("Paste the code you want reviewed...")
            .on_action(Message::CodeEdited)
            .height(Length::Fixed(180.0));

        column![header, editor].spacing(6).into()
    }

    fn chat_area(&self) -> Element<Message> {
        let mut messages = column![].spacing(12).padding(12);

        if let Some(current) = self.registry.current() {
            for message in self.store.messages(&current.id) {
                messages = messages.push(message_bubble(message));
            }
        } else if let Some(error) = &self.load_error {
            messages = messages.push(text(format!("❌ {}", error)).size(15));
        } else if !self.is_loading {
            messages = messages.push(text("No knowledge base is available.").size(15));
        }

        scrollable(messages)
            .width(Length::Fill)
            .height(Length::Fill)
            .anchor_bottom()
            .into()
    }

    fn composer(&self) -> Element<Message> {
        let mut composer = column![].spacing(8);

        if !self.pending_images.is_empty() {
            let mut previews = row![].spacing(8);
            for (index, attachment) in self.pending_images.as_slice().iter().enumerate() {
                previews = previews.push(
                    column![
                        image(image::Handle::from_bytes(attachment.bytes.clone()))
                            .width(Length::Fixed(90.0)),
                        button(text("×").size(12))
                            .padding(2)
                            .style(button::danger)
                            .on_press(Message::RemoveImage(index)),
                    ]
                    .spacing(2)
                    .align_x(alignment::Horizontal::Center),
                );
            }
            composer = composer.push(previews);
        }

        let input = text_input("Ask a question...", &self.question)
            .on_input(Message::QuestionChanged)
            .on_submit(Message::Submit)
            .padding(12)
            .size(16)
            .id(self.input_id.clone());

        let mut input_row = row![].spacing(8).align_y(alignment::Vertical::Center);

        let supports_images = self
            .registry
            .current()
            .map(|current| current.supports_images)
            .unwrap_or(false);
        if supports_images {
            input_row = input_row.push(
                button(text("📷").size(16))
                    .padding(8)
                    .style(button::secondary)
                    .on_press_maybe((!self.is_loading).then_some(Message::AttachImages)),
            );
        }

        input_row = input_row
            .push(input)
            .push(
                button(text("Send").size(16))
                    .padding(8)
                    .on_press_maybe(self.can_send().then_some(Message::Submit)),
            )
            .push(
                button(text("Clear").size(16))
                    .padding(8)
                    .style(button::secondary)
                    .on_press_maybe(self.registry.current().map(|_| Message::ClearChat)),
            );

        composer.push(input_row).into()
    }

    fn busy_overlay(&self) -> Element<Message> {
        let spinner = LOADING_FRAMES[self.loading_frame % LOADING_FRAMES.len()];

        let mut lines = column![
            text(spinner).size(32),
            text(self.busy_message.as_str()).size(15),
            text("This can take a few minutes...").size(12),
        ]
        .spacing(10)
        .align_x(alignment::Horizontal::Center);

        if let Some(entry) = status::recent(1).into_iter().next() {
            if entry.kind == status::Kind::Http {
                lines = lines.push(text(entry.text).size(12));
            }
        }

        container(lines)
            .width(Length::Fill)
            .height(Length::Fill)
            .align_x(alignment::Horizontal::Center)
            .align_y(alignment::Vertical::Center)
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}

fn message_bubble(message: &ChatMessage) -> Element<'_, Message> {
    let sender_label = match message.sender {
        Sender::User => "You",
        Sender::Assistant => "Assistant",
    };

    let mut body = column![].spacing(8);

    if !message.images.is_empty() {
        let mut images = row![].spacing(8);
        for attachment in &message.images {
            images = images.push(
                image(image::Handle::from_bytes(attachment.bytes.clone()))
                    .width(Length::Fixed(160.0)),
            );
        }
        body = body.push(images);
    }

    for block in &message.document.blocks {
        body = body.push(block_view(block));
    }

    container(column![text(sender_label).size(12), body].spacing(6))
        .padding(10)
        .width(Length::Fill)
        .style(match message.sender {
            Sender::User => container::bordered_box,
            Sender::Assistant => container::rounded_box,
        })
        .into()
}

fn block_view(block: &Block) -> Element<'_, Message> {
    match block {
        Block::Paragraph(content) => text(content.as_str()).size(15).into(),
        Block::Heading { level, text: heading } => {
            let size = match *level {
                1 => 22.0,
                2 => 19.0,
                _ => 17.0,
            };
            text(heading.as_str()).size(size).into()
        }
        Block::Quote(content) => container(text(content.as_str()).size(15))
            .padding(Padding::from([4, 10]))
            .style(container::bordered_box)
            .into(),
        Block::Bullets(items) => {
            let mut list = column![].spacing(2);
            for item in items {
                list = list.push(text(format!("• {}", item)).size(15));
            }
            list.into()
        }
        Block::Code { language, source } => {
            let header = row![
                text(language.as_str()).size(12),
                Space::with_width(Length::Fill),
                button(text("Copy").size(12))
                    .padding(4)
                    .style(button::text)
                    .on_press(Message::CopyText(source.clone())),
            ]
            .align_y(alignment::Vertical::Center);

            column![
                header,
                container(text(source.as_str()).size(14).font(Font::MONOSPACE))
                    .padding(8)
                    .width(Length::Fill)
                    .style(container::rounded_box),
            ]
            .spacing(2)
            .into()
        }
    }
}

async fn pick_images() -> Vec<Result<ImageAttachment, AttachmentError>> {
    let Some(files) = rfd::AsyncFileDialog::new()
        .add_filter("Images", &["png", "jpg", "jpeg", "gif", "webp"])
        .set_title("Attach images")
        .pick_files()
        .await
    else {
        return Vec::new();
    };

    let mut loaded = Vec::new();
    for file in files {
        loaded.push(ImageAttachment::load(file.path().to_path_buf()).await);
    }
    loaded
}
