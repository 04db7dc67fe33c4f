/// Minimum password length accepted by the auth provider.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Advisory password strength. Never gates submission on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PasswordStrength {
    score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StrengthLevel {
    VeryWeak,
    Weak,
    Medium,
    Strong,
    Excellent,
}

impl PasswordStrength {
    pub const MAX_SCORE: u8 = 5;

    /// One point each for: length >= 6, length >= 8, an uppercase letter,
    /// a digit, a non-alphanumeric symbol.
    pub fn score(password: &str) -> Self {
        let len = password.chars().count();
        let checks = [
            len >= MIN_PASSWORD_LEN,
            len >= 8,
            password.chars().any(char::is_uppercase),
            password.chars().any(|c| c.is_ascii_digit()),
            password.chars().any(|c| !c.is_alphanumeric()),
        ];
        Self {
            score: checks.iter().filter(|&&hit| hit).count() as u8,
        }
    }

    pub fn value(self) -> u8 {
        self.score
    }

    pub fn level(self) -> StrengthLevel {
        match self.score {
            0 | 1 => StrengthLevel::VeryWeak,
            2 => StrengthLevel::Weak,
            3 => StrengthLevel::Medium,
            4 => StrengthLevel::Strong,
            _ => StrengthLevel::Excellent,
        }
    }

    pub fn label(self) -> &'static str {
        self.level().label()
    }

    pub fn color(self) -> &'static str {
        self.level().color()
    }
}

impl StrengthLevel {
    pub fn label(self) -> &'static str {
        match self {
            Self::VeryWeak => "Very weak",
            Self::Weak => "Weak",
            Self::Medium => "Medium",
            Self::Strong => "Strong",
            Self::Excellent => "Excellent",
        }
    }

    /// Red to green, one step per level.
    pub fn color(self) -> &'static str {
        match self {
            Self::VeryWeak => "#ed4245",
            Self::Weak => "#f57731",
            Self::Medium => "#faa61a",
            Self::Strong => "#7bc96f",
            Self::Excellent => "#3ba55c",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_char_mixed_password_misses_only_the_length_bonus() {
        let s = PasswordStrength::score("Aa1!aa");
        assert_eq!(s.value(), 4);
        assert_eq!(s.label(), "Strong");

        let s = PasswordStrength::score("Aa1!aaaa");
        assert_eq!(s.value(), PasswordStrength::MAX_SCORE);
        assert_eq!(s.label(), "Excellent");
    }

    #[test]
    fn every_criterion_counts_once() {
        assert_eq!(PasswordStrength::score("").value(), 0);
        assert_eq!(PasswordStrength::score("abcdef").value(), 1);
        assert_eq!(PasswordStrength::score("abcdefgh").value(), 2);
        assert_eq!(PasswordStrength::score("Abcdefgh").value(), 3);
        assert_eq!(PasswordStrength::score("Abcdefg1").value(), 4);
        assert_eq!(PasswordStrength::score("Abcdef1!").value(), 5);
        assert_eq!(PasswordStrength::score("Abcdef1!").label(), "Excellent");
    }

    #[test]
    fn levels_bucket_scores() {
        assert_eq!(PasswordStrength::score("a").level(), StrengthLevel::VeryWeak);
        assert_eq!(PasswordStrength::score("abcdef").level(), StrengthLevel::VeryWeak);
        assert_eq!(PasswordStrength::score("abcdefgh").level(), StrengthLevel::Weak);
        assert_eq!(PasswordStrength::score("Abcdefgh").level(), StrengthLevel::Medium);
    }

    #[test]
    fn color_ramp_is_distinct_per_level() {
        let levels = [
            StrengthLevel::VeryWeak,
            StrengthLevel::Weak,
            StrengthLevel::Medium,
            StrengthLevel::Strong,
            StrengthLevel::Excellent,
        ];
        let mut colors: Vec<_> = levels.iter().map(|l| l.color()).collect();
        colors.dedup();
        assert_eq!(colors.len(), levels.len());
    }
}
