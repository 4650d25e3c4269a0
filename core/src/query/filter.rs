//! Row filters used by select

/// Decides whether a stored value passes a select condition.
pub trait Filter {
    fn compare(&self, value: &str, parameter: &str) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&str, &str) -> bool,
{
    fn compare(&self, value: &str, parameter: &str) -> bool {
        self(value, parameter)
    }
}

/// Text equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eq;

/// Text inequality.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ne;

#[derive(Debug, Clone, Copy, Default)]
pub struct Lt;

#[derive(Debug, Clone, Copy, Default)]
pub struct Gt;

#[derive(Debug, Clone, Copy, Default)]
pub struct Le;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ge;

impl Filter for Eq {
    fn compare(&self, value: &str, parameter: &str) -> bool {
        value == parameter
    }
}

impl Filter for Ne {
    fn compare(&self, value: &str, parameter: &str) -> bool {
        value != parameter
    }
}

/// Both sides as numbers, or `None` if either is not one.
fn numbers(value: &str, parameter: &str) -> Option<(f64, f64)> {
    let value = value.trim().parse::<f64>().ok()?;
    let parameter = parameter.trim().parse::<f64>().ok()?;
    Some((value, parameter))
}

impl Filter for Lt {
    fn compare(&self, value: &str, parameter: &str) -> bool {
        numbers(value, parameter).is_some_and(|(a, b)| a < b)
    }
}

impl Filter for Gt {
    fn compare(&self, value: &str, parameter: &str) -> bool {
        numbers(value, parameter).is_some_and(|(a, b)| a > b)
    }
}

impl Filter for Le {
    fn compare(&self, value: &str, parameter: &str) -> bool {
        numbers(value, parameter).is_some_and(|(a, b)| a <= b)
    }
}

impl Filter for Ge {
    fn compare(&self, value: &str, parameter: &str) -> bool {
        numbers(value, parameter).is_some_and(|(a, b)| a >= b)
    }
}
