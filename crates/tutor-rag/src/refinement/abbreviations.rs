//! Domain abbreviations expanded during query rewriting

use crate::types::Mode;

/// Abbreviation table for a mode, as `(short, expanded)` pairs
pub fn abbreviations(mode: Mode) -> &'static [(&'static str, &'static str)] {
    match mode {
        Mode::MathSolve => &[
            ("eq", "equation"),
            ("eqn", "equation"),
            ("deriv", "derivative"),
            ("integ", "integral"),
            ("func", "function"),
            ("sqrt", "square root"),
            ("lcm", "least common multiple"),
            ("gcd", "greatest common divisor"),
            ("prob", "probability"),
            ("trig", "trigonometry"),
        ],
        Mode::PhysicsSolve => &[
            ("vel", "velocity"),
            ("accel", "acceleration"),
            ("mom", "momentum"),
            ("ke", "kinetic energy"),
            ("pe", "potential energy"),
            ("emf", "electromotive force"),
            ("freq", "frequency"),
            ("temp", "temperature"),
        ],
        Mode::ChemistrySolve => &[
            ("mol", "mole"),
            ("conc", "concentration"),
            ("rxn", "reaction"),
            ("eq", "equilibrium"),
            ("soln", "solution"),
            ("ppt", "precipitate"),
            ("stp", "standard temperature and pressure"),
            ("mw", "molecular weight"),
        ],
        Mode::Research => &[
            ("info", "information"),
            ("hist", "history"),
            ("bio", "biology"),
            ("geo", "geography"),
            ("econ", "economics"),
            ("govt", "government"),
        ],
        Mode::QuizCreate | Mode::ExamCreate => &[
            ("q", "question"),
            ("qs", "questions"),
            ("mcq", "multiple choice question"),
            ("t/f", "true or false"),
            ("ans", "answer"),
        ],
    }
}

/// Expand whole-word abbreviations in a query, preserving everything else
pub fn expand_abbreviations(query: &str, mode: Mode) -> String {
    let table = abbreviations(mode);

    query
        .split(' ')
        .map(|word| {
            let trimmed = word.trim_matches(|c: char| c.is_ascii_punctuation() && c != '/');
            let lower = trimmed.to_lowercase();
            match table.iter().find(|(short, _)| *short == lower) {
                Some((_, expanded)) if !trimmed.is_empty() => word.replacen(trimmed, expanded, 1),
                _ => word.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mode_has_a_table() {
        for mode in Mode::ALL {
            assert!(!abbreviations(mode).is_empty(), "{}", mode);
        }
    }

    #[test]
    fn test_expansion_is_mode_specific() {
        assert_eq!(
            expand_abbreviations("solve this eq?", Mode::MathSolve),
            "solve this equation?"
        );
        assert_eq!(
            expand_abbreviations("shift the eq", Mode::ChemistrySolve),
            "shift the equilibrium"
        );
        assert_eq!(
            expand_abbreviations("equation of motion", Mode::MathSolve),
            "equation of motion"
        );
    }
}
