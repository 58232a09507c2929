//! Named template-asset catalog.
//!
//! Assets live in a directory tree organized by feature area (target-app
//! chrome, browser pages, mail content markers). A control that renders
//! differently per UI theme gets one asset per theme; call sites probe the
//! whole list with `locate_any`.

use std::path::PathBuf;

use crate::template::TemplateRef;

#[derive(Debug, Clone)]
pub struct AssetCatalog {
    root: PathBuf,
}

impl AssetCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn single(&self, rel: &str) -> Vec<TemplateRef> {
        vec![TemplateRef::new(self.root.join(rel))]
    }

    /// Light and dark variants of one target-app control.
    fn themed(&self, stem: &str) -> Vec<TemplateRef> {
        vec![
            TemplateRef::new(self.root.join(format!("app/{stem}-light.png"))),
            TemplateRef::new(self.root.join(format!("app/{stem}-dark.png"))),
        ]
    }

    // Target-app chrome.

    pub fn setting_button(&self) -> Vec<TemplateRef> {
        self.themed("setting-button")
    }

    pub fn manage_button(&self) -> Vec<TemplateRef> {
        self.themed("manage-button")
    }

    pub fn sign_button(&self) -> Vec<TemplateRef> {
        self.themed("sign-button")
    }

    pub fn logout_button(&self) -> Vec<TemplateRef> {
        self.themed("logout-button")
    }

    // Browser: authentication and settings pages.

    pub fn auth_blur_spot(&self) -> Vec<TemplateRef> {
        self.single("browser/sign-blur.png")
    }

    pub fn settings_page_marker(&self) -> Vec<TemplateRef> {
        self.single("browser/settings-page.png")
    }

    pub fn advanced_button(&self) -> Vec<TemplateRef> {
        self.single("browser/advanced-button.png")
    }

    pub fn delete_button(&self) -> Vec<TemplateRef> {
        self.single("browser/delete-button.png")
    }

    pub fn confirm_input(&self) -> Vec<TemplateRef> {
        self.single("browser/input-confirm.png")
    }

    pub fn delete_confirm_button(&self) -> Vec<TemplateRef> {
        self.single("browser/btn-delete-confirm.png")
    }

    pub fn send_code_button(&self) -> Vec<TemplateRef> {
        self.single("browser/btn-email-code.png")
    }

    pub fn robot_check(&self) -> Vec<TemplateRef> {
        self.single("browser/btn-robot-check.png")
    }

    pub fn enter_code_page(&self) -> Vec<TemplateRef> {
        self.single("browser/page-enter-code.png")
    }

    pub fn confirm_login_button(&self) -> Vec<TemplateRef> {
        self.single("browser/btn-login-sure.png")
    }

    // Mail content.

    pub fn receive_mail_button(&self) -> Vec<TemplateRef> {
        self.single("mail/btn-receive-mail.png")
    }

    pub fn new_mail_row(&self) -> Vec<TemplateRef> {
        self.single("mail/btn-new-mail.png")
    }

    pub fn mark_all_read_button(&self) -> Vec<TemplateRef> {
        self.single("mail/btn-all-read.png")
    }

    pub fn code_start_marker(&self) -> Vec<TemplateRef> {
        self.single("mail/text-code-start.png")
    }

    pub fn code_end_marker(&self) -> Vec<TemplateRef> {
        self.single("mail/text-code-end.png")
    }
}
