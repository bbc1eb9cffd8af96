//! Unix mode bits and `ls -l` style rendering.

/// Mask for the file-type bits of `st_mode`.
pub const S_IFMT: u32 = 0o170000;
/// Regular file type bits.
pub const S_IFREG: u32 = 0o100000;
/// Directory type bits.
pub const S_IFDIR: u32 = 0o040000;
/// Symbolic link type bits.
pub const S_IFLNK: u32 = 0o120000;

/// Set-user-ID bit.
pub const S_ISUID: u32 = 0o4000;
/// Set-group-ID bit.
pub const S_ISGID: u32 = 0o2000;
/// Sticky bit.
pub const S_ISVTX: u32 = 0o1000;

/// Permission plus special bits.
pub const MODE_MASK: u32 = 0o7777;
/// Permission bits only.
pub const PERM_MASK: u32 = 0o777;

/// OR the requested special bits onto `mode`.
pub fn apply_special_bits(mode: u32, setuid: bool, setgid: bool, sticky: bool) -> u32 {
    let mut mode = mode;
    if setuid {
        mode |= S_ISUID;
    }
    if setgid {
        mode |= S_ISGID;
    }
    if sticky {
        mode |= S_ISVTX;
    }
    mode
}

/// Map `st_mode` file-type bits to the leading `ls -l` character.
pub fn type_char_from_mode(mode: u32) -> char {
    match mode & S_IFMT {
        S_IFLNK => 'l',
        S_IFDIR => 'd',
        _ => '-',
    }
}

/// Render a mode as a ten-character permission string such as `-rwsr-xr-x`.
///
/// `type_char` is the leading character (`-`, `d`, `l`, `h`, ...). Setuid and
/// setgid show as `s` (or `S` without execute), sticky as `t` (or `T`).
pub fn format_mode(type_char: char, mode: u32) -> String {
    let mut out = String::with_capacity(10);
    out.push(type_char);

    let triads = [
        (6, mode & S_ISUID != 0, 's'),
        (3, mode & S_ISGID != 0, 's'),
        (0, mode & S_ISVTX != 0, 't'),
    ];
    for (shift, special, special_char) in triads {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        let exec = bits & 0o1 != 0;
        out.push(match (special, exec) {
            (true, true) => special_char,
            (true, false) => special_char.to_ascii_uppercase(),
            (false, true) => 'x',
            (false, false) => '-',
        });
    }
    out
}

/// Render the permission and special bits as four octal digits (`4755`).
pub fn format_octal(mode: u32) -> String {
    format!("{:04o}", mode & MODE_MASK)
}
