use tokio::{
    fs::File,
    io::{self, AsyncBufReadExt, Lines},
};

/// Read a file from the given path into a list of trimmed, non-empty lines
pub async fn read_lines(path: &str) -> io::Result<Vec<String>> {
    let mut r = line_reader(path).await?;
    let mut lines = Vec::new();

    while let Some(line) = r.next_line().await? {
        let line = line.trim();

        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }

    Ok(lines)
}

async fn line_reader(path: &str) -> io::Result<Lines<io::BufReader<File>>> {
    let f = File::open(path).await?;

    Ok(io::BufReader::new(f).lines())
}
