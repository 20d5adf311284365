use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct NewStudent {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub class_name: String,
    #[serde(default)]
    pub grades: Option<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub class_name: Option<String>,
    pub grades: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StudentFilter {
    pub class_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewTeacher {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub phone: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeacherUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeacherFilter {
    pub subject: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewAdministrator {
    pub name: String,
    pub email: String,
}

/// Name of the first required field that is blank, if any.
fn first_blank<'a>(fields: &[(&'a str, &str)]) -> Option<&'a str> {
    fields
        .iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
}

impl NewStudent {
    pub fn missing_field(&self) -> Option<&'static str> {
        first_blank(&[
            ("name", self.name.as_str()),
            ("email", self.email.as_str()),
            ("phone", self.phone.as_str()),
            ("class_name", self.class_name.as_str()),
        ])
    }
}

impl NewTeacher {
    pub fn missing_field(&self) -> Option<&'static str> {
        first_blank(&[
            ("name", self.name.as_str()),
            ("email", self.email.as_str()),
            ("subject", self.subject.as_str()),
            ("phone", self.phone.as_str()),
        ])
    }
}

/// Name of the first field that is present but blank.
fn first_blank_present<'a>(fields: &[(&'a str, Option<&str>)]) -> Option<&'a str> {
    fields
        .iter()
        .find(|(_, value)| value.is_some_and(|v| v.trim().is_empty()))
        .map(|(name, _)| *name)
}

impl StudentUpdate {
    pub fn blank_field(&self) -> Option<&'static str> {
        first_blank_present(&[
            ("name", self.name.as_deref()),
            ("email", self.email.as_deref()),
            ("phone", self.phone.as_deref()),
            ("class_name", self.class_name.as_deref()),
        ])
    }
}

impl TeacherUpdate {
    pub fn blank_field(&self) -> Option<&'static str> {
        first_blank_present(&[
            ("name", self.name.as_deref()),
            ("email", self.email.as_deref()),
            ("subject", self.subject.as_deref()),
            ("phone", self.phone.as_deref()),
        ])
    }
}

impl NewAdministrator {
    pub fn missing_field(&self) -> Option<&'static str> {
        first_blank(&[("name", self.name.as_str()), ("email", self.email.as_str())])
    }
}
