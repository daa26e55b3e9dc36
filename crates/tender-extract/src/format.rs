use crate::archive::base_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Doc,
    Xlsx,
    Xls,
    Txt,
    Unsupported,
}

impl DocumentFormat {
    pub fn from_filename(filename: &str) -> Self {
        let base = base_name(filename);
        let ext = match base.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return Self::Unsupported,
        };
        match ext.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "doc" => Self::Doc,
            "xlsx" => Self::Xlsx,
            "xls" => Self::Xls,
            "txt" => Self::Txt,
            _ => Self::Unsupported,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Self::Doc => "application/msword",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Xls => "application/vnd.ms-excel",
            Self::Txt => "text/plain",
            Self::Unsupported => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_extension_case_insensitively() {
        assert_eq!(DocumentFormat::from_filename("dossier/AVIS.PDF"), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::from_filename("cps.docx"), DocumentFormat::Docx);
        assert_eq!(DocumentFormat::from_filename("bpu.xls"), DocumentFormat::Xls);
        assert_eq!(DocumentFormat::from_filename("plan.dwg"), DocumentFormat::Unsupported);
        assert_eq!(DocumentFormat::from_filename("README"), DocumentFormat::Unsupported);
        assert_eq!(DocumentFormat::from_filename("v1.0/notes"), DocumentFormat::Unsupported);
    }

    #[test]
    fn unknown_formats_map_to_octet_stream() {
        assert_eq!(DocumentFormat::Unsupported.mime_type(), "application/octet-stream");
        assert_eq!(DocumentFormat::Doc.mime_type(), "application/msword");
    }
}
