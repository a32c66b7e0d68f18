//! Small helper macros.

/// Call `print!` and immediately flush.
#[macro_export]
macro_rules! print_flush {
    ( $fmt:literal $(, $val:expr )* $(,)?) => {
        print!($fmt $(, $val )*);
        std::io::Write::flush(&mut std::io::stdout()).unwrap();
    }
}

/// Call `println!` and immediately flush.
#[macro_export]
macro_rules! println_flush {
    ( $fmt:literal $(, $val:expr )* $(,)?) => {
        println!($fmt $(, $val, )*);
        std::io::Write::flush(&mut std::io::stdout()).unwrap();
    }
}

/// Create a directory, with all parents, if it doesn't exist.
#[macro_export]
macro_rules! mkdir {
    ( $dir:expr ) => {
        if !$dir.is_dir() {
            println!(":: mkdir -p {}", $dir.display());
            std::fs::create_dir_all(&$dir)
                .unwrap_or_else(|_| {
                    panic!("couldn't create directory {:?}", $dir)
                });
        }
    }
}
