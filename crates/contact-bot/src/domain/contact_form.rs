use thiserror::Error;

/// Reply-keyboard button that leaves an optional field empty.
pub const SKIP_LABEL: &str = "⏭️ Sari peste";

/// Stored in place of a skipped field.
pub const UNSPECIFIED: &str = "Nespecificat";

pub const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M";

#[derive(Error, Debug, PartialEq)]
pub enum FormError {
    #[error("the form is already complete")]
    AlreadyComplete,
    #[error("the form is not complete yet, next step is {0:?}")]
    Incomplete(FormStep),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormStep {
    Company,
    Phone,
    Email,
    Description,
}

impl FormStep {
    pub fn next(self) -> Option<FormStep> {
        match self {
            FormStep::Company => Some(FormStep::Phone),
            FormStep::Phone => Some(FormStep::Email),
            FormStep::Email => Some(FormStep::Description),
            FormStep::Description => None,
        }
    }

    pub fn skippable(self) -> bool {
        self != FormStep::Company
    }
}

/// Case-insensitive match against [`SKIP_LABEL`].
pub fn is_skip(text: &str) -> bool {
    text.trim().to_lowercase() == SKIP_LABEL.to_lowercase()
}

/// One row of the contact sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactRecord {
    pub company: String,
    pub phone: String,
    pub email: String,
    pub description: String,
    pub author: String,
    pub submitted_at: String,
}

impl ContactRecord {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.company.clone(),
            self.phone.clone(),
            self.email.clone(),
            self.description.clone(),
            self.author.clone(),
            self.submitted_at.clone(),
        ]
    }
}

/// A contact form being filled in, one answer per step.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactForm {
    step: Option<FormStep>,
    company: String,
    phone: String,
    email: String,
    description: String,
}

impl Default for ContactForm {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactForm {
    pub fn new() -> Self {
        Self {
            step: Some(FormStep::Company),
            company: String::new(),
            phone: String::new(),
            email: String::new(),
            description: String::new(),
        }
    }

    /// The step waiting for an answer; `None` once every field is filled.
    pub fn step(&self) -> Option<FormStep> {
        self.step
    }

    /// Record the answer for the current step and advance. A skip on an
    /// optional step stores [`UNSPECIFIED`].
    pub fn answer(&mut self, text: &str) -> Result<Option<FormStep>, FormError> {
        let step = self.step.ok_or(FormError::AlreadyComplete)?;
        let value = if step.skippable() && is_skip(text) {
            UNSPECIFIED.to_string()
        } else {
            text.to_string()
        };
        match step {
            FormStep::Company => self.company = value,
            FormStep::Phone => self.phone = value,
            FormStep::Email => self.email = value,
            FormStep::Description => self.description = value,
        }
        self.step = step.next();
        Ok(self.step)
    }

    pub fn finish(&self, author: &str, submitted_at: &str) -> Result<ContactRecord, FormError> {
        if let Some(step) = self.step {
            return Err(FormError::Incomplete(step));
        }
        Ok(ContactRecord {
            company: self.company.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
            description: self.description.clone(),
            author: author.to_string(),
            submitted_at: submitted_at.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::exact("⏭️ Sari peste", true)]
    #[case::lowercase("⏭️ sari peste", true)]
    #[case::uppercase("⏭️ SARI PESTE", true)]
    #[case::padded("  ⏭️ Sari peste ", true)]
    #[case::without_emoji("Sari peste", false)]
    #[case::other("0722 000 000", false)]
    fn test_is_skip(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(is_skip(text), expected);
    }

    #[test]
    fn test_steps_advance_in_order() {
        let mut form = ContactForm::new();
        assert_eq!(form.answer("Acme Inc"), Ok(Some(FormStep::Phone)));
        assert_eq!(form.answer("0722"), Ok(Some(FormStep::Email)));
        assert_eq!(form.answer("a@b.ro"), Ok(Some(FormStep::Description)));
        assert_eq!(form.answer("Widgets"), Ok(None));
        assert_eq!(form.answer("extra"), Err(FormError::AlreadyComplete));
    }

    #[test]
    fn test_skips_store_unspecified() {
        let mut form = ContactForm::new();
        for text in ["Acme Inc", SKIP_LABEL, SKIP_LABEL, "Widgets"] {
            form.answer(text).unwrap();
        }
        let record = form.finish("@ana", "01.02.2024 10:30").unwrap();
        assert_eq!(
            record.to_row(),
            vec!["Acme Inc", "Nespecificat", "Nespecificat", "Widgets", "@ana", "01.02.2024 10:30"]
        );
    }

    #[test]
    fn test_company_cannot_be_skipped() {
        let mut form = ContactForm::new();
        form.answer(SKIP_LABEL).unwrap();
        for text in ["1", "2", "3"] {
            form.answer(text).unwrap();
        }
        assert_eq!(form.finish("@x", "t").unwrap().company, SKIP_LABEL);
    }

    #[test]
    fn test_finish_incomplete() {
        let mut form = ContactForm::new();
        form.answer("Acme").unwrap();
        assert_eq!(form.finish("@x", "t"), Err(FormError::Incomplete(FormStep::Phone)));
    }
}
