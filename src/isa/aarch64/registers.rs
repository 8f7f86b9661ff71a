//! AArch64 register name formatting (`x0`..`x30`, `d0`..`d31`).

pub fn int_name(reg: u16) -> String {
    match reg {
        29 => "x29".to_string(),
        30 => "x30".to_string(),
        r => format!("x{r}"),
    }
}

pub fn float_name(reg: u16) -> String {
    format!("d{reg}")
}
