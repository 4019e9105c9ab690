use gpui::*;
use gpui_component::{ActiveTheme, Icon, IconName, h_flex, label::Label, v_flex};

use aura_chat::ChatController;

use crate::chat::ChatView;

pub const APP_TITLE: &str = "AURA AI";

gpui::actions!(shell, [Quit]);

/// Computes the header height from the rem size so it follows font scaling.
fn header_height(window: &Window) -> Pixels {
    (2.5 * window.rem_size()).max(px(44.0))
}

/// Root layout: a fixed header above the chat view.
pub struct AuraAppShell {
    chat_view: Entity<ChatView>,
}

impl AuraAppShell {
    pub fn new(controller: ChatController, window: &mut Window, cx: &mut Context<Self>) -> Self {
        let chat_view = cx.new(|cx| ChatView::new(controller, window, cx));
        cx.observe(&chat_view, |_, _, cx| cx.notify()).detach();

        Self { chat_view }
    }

    fn render_header(&self, window: &Window, cx: &Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let busy = self.chat_view.read(cx).is_busy();

        h_flex()
            .id("app-header")
            .w_full()
            .h(header_height(window))
            .flex_shrink_0()
            .px_4()
            .gap_3()
            .items_center()
            .bg(theme.background)
            .border_b_1()
            .border_color(theme.border)
            .child(
                Icon::new(IconName::Bot)
                    .size(px(24.))
                    .text_color(theme.primary),
            )
            .child(Label::new(APP_TITLE).text_xl().font_weight(FontWeight::BOLD))
            .child(div().flex_1())
            .child(
                Label::new(if busy { "Thinking..." } else { "" })
                    .text_xs()
                    .text_color(theme.muted_foreground),
            )
    }
}

impl Render for AuraAppShell {
    fn render(&mut self, window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        v_flex()
            .id("app-shell")
            .size_full()
            .bg(theme.background)
            .child(self.render_header(window, cx))
            .child(
                div()
                    .id("main-content")
                    .flex_1()
                    .min_h_0()
                    .overflow_hidden()
                    .child(self.chat_view.clone()),
            )
    }
}

