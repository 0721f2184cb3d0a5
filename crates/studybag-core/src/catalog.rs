//! Built-in catalog of study materials and the dashboard filters over it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialKind {
    #[serde(rename = "Question Paper")]
    QuestionPaper,
    Notes,
    Syllabus,
}

impl MaterialKind {
    pub fn all() -> [MaterialKind; 3] {
        [
            MaterialKind::QuestionPaper,
            MaterialKind::Notes,
            MaterialKind::Syllabus,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialKind::QuestionPaper => "Question Paper",
            MaterialKind::Notes => "Notes",
            MaterialKind::Syllabus => "Syllabus",
        }
    }

    /// Accepts display names and short CLI spellings ("qp", "question-paper").
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['-', '_'], " ").trim() {
            "question paper" | "question papers" | "qp" => Some(MaterialKind::QuestionPaper),
            "notes" | "note" => Some(MaterialKind::Notes),
            "syllabus" => Some(MaterialKind::Syllabus),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    pub subject: String,
    pub semester: u8,
    pub year: u16,
    pub description: String,
    pub file_url: String,
}

/// `None` in any field means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialFilter {
    pub semester: Option<u8>,
    pub subject: Option<String>,
    pub kind: Option<MaterialKind>,
}

impl MaterialFilter {
    pub fn matches(&self, material: &Material) -> bool {
        self.semester.map_or(true, |s| material.semester == s)
            && self
                .subject
                .as_deref()
                .map_or(true, |s| material.subject == s)
            && self.kind.map_or(true, |k| material.kind == k)
    }
}

pub struct Catalog {
    materials: Vec<Material>,
    subjects: Vec<String>,
    semesters: Vec<u8>,
}

impl Catalog {
    pub fn new(materials: Vec<Material>, subjects: Vec<String>, semesters: Vec<u8>) -> Self {
        Self {
            materials,
            subjects,
            semesters,
        }
    }

    pub fn builtin() -> Self {
        let material = |id: &str,
                        title: &str,
                        kind: MaterialKind,
                        subject: &str,
                        semester: u8,
                        year: u16,
                        description: &str| Material {
            id: id.to_string(),
            title: title.to_string(),
            kind,
            subject: subject.to_string(),
            semester,
            year,
            description: description.to_string(),
            file_url: "/path/to/dummy.pdf".to_string(),
        };

        let materials = vec![
            material(
                "ds-qp-2023",
                "DS Question Paper 2023",
                MaterialKind::QuestionPaper,
                "Data Structures",
                3,
                2023,
                "Final term question paper for Data Structures.",
            ),
            material(
                "algo-notes-unit1",
                "Algorithms Unit 1 Notes",
                MaterialKind::Notes,
                "Algorithms",
                4,
                2024,
                "Comprehensive notes for the first unit of Algorithms.",
            ),
            material(
                "os-syllabus",
                "Operating Systems Syllabus",
                MaterialKind::Syllabus,
                "Operating Systems",
                5,
                2024,
                "Official syllabus for the OS course.",
            ),
            material(
                "dbms-qp-2022",
                "DBMS Question Paper 2022",
                MaterialKind::QuestionPaper,
                "Database Management",
                5,
                2022,
                "Mid-term question paper for DBMS.",
            ),
            material(
                "cn-notes-full",
                "Computer Networks Full Notes",
                MaterialKind::Notes,
                "Computer Networks",
                6,
                2023,
                "Complete handwritten notes for all units of CN.",
            ),
            material(
                "se-qp-2023-internals",
                "SE Internals Paper 2023",
                MaterialKind::QuestionPaper,
                "Software Engineering",
                6,
                2023,
                "Internal assessment question paper.",
            ),
            material(
                "ds-notes-unit2",
                "DS Unit 2 Notes",
                MaterialKind::Notes,
                "Data Structures",
                3,
                2024,
                "Detailed notes on Trees and Graphs.",
            ),
            material(
                "algo-qp-2023",
                "Algorithms QP 2023",
                MaterialKind::QuestionPaper,
                "Algorithms",
                4,
                2023,
                "Final exam paper for Algorithms course.",
            ),
        ];

        let subjects = [
            "Data Structures",
            "Algorithms",
            "Operating Systems",
            "Database Management",
            "Computer Networks",
            "Software Engineering",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self::new(materials, subjects, (1..=8).collect())
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    pub fn semesters(&self) -> &[u8] {
        &self.semesters
    }

    pub fn get(&self, id: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.id == id)
    }

    pub fn filter(&self, filter: &MaterialFilter) -> Vec<&Material> {
        self.materials.iter().filter(|m| filter.matches(m)).collect()
    }
}
