use serde::{Deserialize, Serialize};

use crate::parse::find_phone_candidate;
use crate::FieldValue;

/// International calling codes accepted as an existing prefix.
const KNOWN_CALLING_CODES: &[&str] = &[
    "1", "7", "20", "27", "30", "31", "32", "33", "34", "36", "39", "40", "41", "43", "44", "45",
    "46", "47", "48", "49", "51", "52", "53", "54", "55", "56", "57", "58", "60", "61", "62", "63",
    "64", "65", "66", "81", "82", "84", "86", "90", "91", "92", "93", "94", "95", "98", "211",
    "212", "213", "216", "218", "220", "221", "222", "223", "224", "225", "226", "227", "228",
    "229", "230", "231", "232", "233", "234", "235", "236", "237", "238", "239", "240", "241",
    "242", "243", "244", "245", "246", "247", "248", "249", "250", "251", "252", "253", "254",
    "255", "256", "257", "258", "260", "261", "262", "263", "264", "265", "266", "267", "268",
    "269", "290", "291", "297", "298", "299", "350", "351", "352", "353", "354", "355", "356",
    "357", "358", "359", "370", "371", "372", "373", "374", "375", "376", "377", "378", "379",
    "380", "381", "382", "383", "385", "386", "387", "389", "420", "421", "423", "500", "501",
    "502", "503", "504", "505", "506", "507", "508", "509", "590", "591", "592", "593", "594",
    "595", "596", "597", "598", "599", "670", "672", "673", "674", "675", "676", "677", "678",
    "679", "680", "681", "682", "683", "685", "686", "687", "688", "689", "690", "691", "692",
    "693", "694", "695", "696", "697", "698", "850", "852", "853", "855", "856", "870", "872",
    "880", "886", "960", "961", "962", "963", "964", "965", "966", "967", "968", "970", "971",
    "972", "973", "974", "975", "976", "977", "992", "993", "994", "995", "996", "998",
];

const NATIONAL_DIGITS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneSettings {
    /// Country code assumed for bare 10-digit mobile numbers.
    pub mobile_country_code: String,
    /// Leading digits that identify a bare 10-digit mobile number.
    pub mobile_leading_digits: String,
    /// Country code for any other bare 10-digit number.
    pub fallback_country_code: String,
}

impl Default for PhoneSettings {
    fn default() -> Self {
        Self {
            mobile_country_code: "91".to_string(),
            mobile_leading_digits: "6789".to_string(),
            fallback_country_code: "1".to_string(),
        }
    }
}

/// Canonicalizes phone-like text into `+<country><national>` form.
#[derive(Debug, Clone, Default)]
pub struct PhoneNormalizer {
    settings: PhoneSettings,
}

impl PhoneNormalizer {
    pub fn new(settings: PhoneSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PhoneSettings {
        &self.settings
    }

    /// Total: never panics, returns `Absent` for anything that is not a
    /// recognizable number. Idempotent on its own output.
    pub fn normalize(&self, raw: &str) -> FieldValue {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.len() < NATIONAL_DIGITS {
            return FieldValue::Absent;
        }

        let mobile_code = self.settings.mobile_country_code.as_str();

        if digits.len() == NATIONAL_DIGITS && self.is_mobile_leading(&digits) {
            return FieldValue::Text(format!("+{mobile_code}{digits}"));
        }

        if digits.len() == mobile_code.len() + NATIONAL_DIGITS
            && digits.starts_with(mobile_code)
            && self.is_mobile_leading(&digits[mobile_code.len()..])
        {
            return FieldValue::Text(format!("+{digits}"));
        }

        if self.has_known_prefix(&digits) {
            return FieldValue::Text(format!("+{digits}"));
        }

        if digits.len() == NATIONAL_DIGITS {
            return FieldValue::Text(format!(
                "+{}{digits}",
                self.settings.fallback_country_code
            ));
        }

        FieldValue::Absent
    }

    /// Searches free text for the first phone number that normalizes.
    pub fn find_in_text(&self, text: &str) -> FieldValue {
        match find_phone_candidate(text) {
            Some(candidate) => self.normalize(&candidate),
            None => FieldValue::Absent,
        }
    }

    fn is_mobile_leading(&self, national: &str) -> bool {
        national
            .chars()
            .next()
            .is_some_and(|first| self.settings.mobile_leading_digits.contains(first))
    }

    // The configured codes count as known so that normalized output is
    // recognized again on a second pass.
    fn has_known_prefix(&self, digits: &str) -> bool {
        let configured = [
            self.settings.mobile_country_code.as_str(),
            self.settings.fallback_country_code.as_str(),
        ];
        KNOWN_CALLING_CODES
            .iter()
            .copied()
            .chain(configured)
            .filter(|code| !code.is_empty())
            .any(|code| digits.starts_with(code))
    }
}

#[cfg(test)]
mod tests {
    use super::{PhoneNormalizer, PhoneSettings};
    use crate::FieldValue;

    fn normalize(raw: &str) -> FieldValue {
        PhoneNormalizer::default().normalize(raw)
    }

    #[test]
    fn bare_mobile_gets_assumed_country_code() {
        assert_eq!(normalize("98765 43210"), FieldValue::text("+919876543210"));
        assert_eq!(normalize("(712) 345-6789"), FieldValue::text("+917123456789"));
    }

    #[test]
    fn twelve_digits_with_mobile_code_pass_through() {
        assert_eq!(normalize("91-98765-43210"), FieldValue::text("+919876543210"));
    }

    #[test]
    fn known_international_prefix_passes_through() {
        assert_eq!(normalize("+44 20 7946 0958"), FieldValue::text("+442079460958"));
        assert_eq!(normalize("+1 (212) 555-0187"), FieldValue::text("+12125550187"));
    }

    #[test]
    fn other_ten_digit_numbers_use_fallback() {
        assert_eq!(normalize("(210) 555-0134"), FieldValue::text("+12105550134"));
    }

    #[test]
    fn ten_digits_with_known_prefix_are_kept() {
        assert_eq!(normalize("55 5010 0000"), FieldValue::text("+5550100000"));
    }

    #[test]
    fn short_or_unrecognized_numbers_are_absent() {
        assert_eq!(normalize("123"), FieldValue::Absent);
        assert_eq!(normalize(""), FieldValue::Absent);
        assert_eq!(normalize("no digits here"), FieldValue::Absent);
        assert_eq!(normalize("000 0000 0000"), FieldValue::Absent);
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        for raw in ["98765 43210", "(210) 555-0134", "+44 20 7946 0958", "91 98765 43210"] {
            let once = normalize(raw);
            let twice = normalize(once.as_text().unwrap());
            assert_eq!(once, twice, "input {raw}");
        }
    }

    #[test]
    fn custom_fallback_code_stays_idempotent() {
        let normalizer = PhoneNormalizer::new(PhoneSettings {
            fallback_country_code: "999".to_string(),
            ..PhoneSettings::default()
        });
        let once = normalizer.normalize("(210) 555-0134");
        assert_eq!(once, FieldValue::text("+9992105550134"));
        let twice = normalizer.normalize(once.as_text().unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn finds_number_inside_label_text() {
        let normalizer = PhoneNormalizer::default();
        assert_eq!(
            normalizer.find_in_text("Call us at +91 98765 43210 anytime"),
            FieldValue::text("+919876543210")
        );
        assert_eq!(normalizer.find_in_text("Closed today"), FieldValue::Absent);
    }
}
