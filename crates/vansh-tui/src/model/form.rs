use vansh_core::validate::{self, ValidationError};

/// Which field of the sign-in form has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Email,
    Password,
}

/// Sign-in / registration form state.
#[derive(Debug, Clone)]
pub struct SignInForm {
    pub register: bool,
    pub name: String,
    pub email: String,
    pub password: String,
    pub focus: Field,
    pub error: Option<String>,
    /// A request is in flight; further submits are ignored.
    pub busy: bool,
}

/// What the form asks the backend to do once it validates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Login {
        email: String,
        password: String,
    },
    Register {
        name: String,
        email: String,
        password: String,
    },
}

impl Default for SignInForm {
    fn default() -> Self {
        Self {
            register: false,
            name: String::new(),
            email: String::new(),
            password: String::new(),
            focus: Field::Email,
            error: None,
            busy: false,
        }
    }
}

impl SignInForm {
    pub fn fields(&self) -> &'static [Field] {
        if self.register {
            &[Field::Name, Field::Email, Field::Password]
        } else {
            &[Field::Email, Field::Password]
        }
    }

    pub fn next_field(&mut self) {
        let fields = self.fields();
        let pos = fields.iter().position(|f| *f == self.focus).unwrap_or(0);
        self.focus = fields[(pos + 1) % fields.len()];
    }

    pub fn toggle_register(&mut self) {
        self.register = !self.register;
        self.error = None;
        if !self.fields().contains(&self.focus) {
            self.focus = self.fields()[0];
        }
    }

    fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            Field::Name => &mut self.name,
            Field::Email => &mut self.email,
            Field::Password => &mut self.password,
        }
    }

    pub fn push(&mut self, c: char) {
        self.focused_mut().push(c);
        self.error = None;
    }

    pub fn backspace(&mut self) {
        self.focused_mut().pop();
    }

    /// Validate locally; nothing reaches the network when this fails.
    pub fn credentials(&self) -> Result<Credentials, ValidationError> {
        if self.register {
            let email = validate::registration(&self.email, &self.password, &self.name)?;
            Ok(Credentials::Register {
                name: self.name.trim().to_string(),
                email,
                password: self.password.clone(),
            })
        } else {
            let email = validate::email(&self.email)?;
            Ok(Credentials::Login {
                email,
                password: self.password.clone(),
            })
        }
    }

    /// Clear secrets after a successful sign-in.
    pub fn reset(&mut self) {
        *self = Self {
            email: std::mem::take(&mut self.email),
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_cycles_through_visible_fields() {
        let mut form = SignInForm::default();
        assert_eq!(form.focus, Field::Email);
        form.next_field();
        assert_eq!(form.focus, Field::Password);
        form.next_field();
        assert_eq!(form.focus, Field::Email);

        form.toggle_register();
        form.next_field();
        form.next_field();
        assert_eq!(form.focus, Field::Name);
    }

    #[test]
    fn short_password_fails_registration() {
        let mut form = SignInForm::default();
        form.toggle_register();
        form.name = "Asha".into();
        form.email = "asha@example.com".into();
        form.password = "abc".into();
        assert!(form.credentials().is_err());
        form.password = "abcdef".into();
        assert!(matches!(form.credentials(), Ok(Credentials::Register { .. })));
    }
}
