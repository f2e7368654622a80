//! Parser for MovieLens data files.
//!
//! - users.dat: userId::gender::age::occupation::zipcode (only the id is kept)
//! - movies.dat: movieId::title::genres
//! - ratings.dat: userId::movieId::rating::timestamp

use crate::error::{DataLoadError, Result};
use crate::types::*;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::{FromStr, Split};

/// Read a file with ISO-8859-1 encoding (Latin-1)
///
/// The MovieLens dataset uses ISO-8859-1, not UTF-8. Each byte maps directly
/// to a Unicode code point, so the conversion cannot fail.
fn read_lines_latin1(path: &Path) -> Result<Vec<String>> {
    let mut file = File::open(path).map_err(|_| DataLoadError::FileNotFound {
        path: path.display().to_string(),
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let content: String = bytes.iter().map(|&b| b as char).collect();

    Ok(content.lines().map(|s| s.to_string()).collect())
}

/// Pull the next `::`-separated field or report which one is missing
fn next_field<'a>(
    parts: &mut Split<'a, &'static str>,
    file: &str,
    line: usize,
    name: &str,
) -> Result<&'a str> {
    parts.next().ok_or_else(|| DataLoadError::ParseError {
        file: file.to_string(),
        line,
        reason: format!("Missing {}", name),
    })
}

/// Parse a field into a number, reporting file and line on failure
fn parse_field<T>(value: &str, file: &str, line: usize, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| DataLoadError::ParseError {
        file: file.to_string(),
        line,
        reason: format!("Invalid {}: {}", name, e),
    })
}

/// Iterate non-empty lines with 1-based line numbers
fn data_lines(lines: &[String]) -> impl Iterator<Item = (usize, &str)> {
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

/// Parse the user ids out of users.dat
pub fn parse_users(path: &Path) -> Result<Vec<User>> {
    const FILE: &str = "users.dat";
    let lines = read_lines_latin1(path)?;
    let mut users = Vec::with_capacity(lines.len());

    for (line_no, line) in data_lines(&lines) {
        let mut parts = line.split("::");
        let user_id = next_field(&mut parts, FILE, line_no, "userId")?;
        users.push(User {
            id: parse_field(user_id, FILE, line_no, "userId")?,
        });
    }

    Ok(users)
}

/// Parse the movies.dat file
///
/// The title often includes year in parentheses: "Toy Story (1995)"
/// Tags are pipe-separated: "Animation|Children's|Comedy"
pub fn parse_movies(path: &Path) -> Result<Vec<Movie>> {
    const FILE: &str = "movies.dat";
    let lines = read_lines_latin1(path)?;
    let mut movies = Vec::with_capacity(lines.len());

    for (line_no, line) in data_lines(&lines) {
        let mut parts = line.split("::");
        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let title = next_field(&mut parts, FILE, line_no, "title")?;
        let genres = next_field(&mut parts, FILE, line_no, "genres")?;

        movies.push(Movie::new(
            parse_field(movie_id, FILE, line_no, "movieId")?,
            title,
            extract_year_from_title(title),
            parse_tags(genres),
        ));
    }

    Ok(movies)
}

/// Parse the ratings.dat file into explicit-rating interactions
pub fn parse_ratings(path: &Path) -> Result<Vec<Interaction>> {
    const FILE: &str = "ratings.dat";
    let lines = read_lines_latin1(path)?;
    let mut interactions = Vec::with_capacity(lines.len());

    for (line_no, line) in data_lines(&lines) {
        let mut parts = line.split("::");
        let user_id = next_field(&mut parts, FILE, line_no, "userId")?;
        let movie_id = next_field(&mut parts, FILE, line_no, "movieId")?;
        let rating = next_field(&mut parts, FILE, line_no, "rating")?;
        let timestamp = next_field(&mut parts, FILE, line_no, "timestamp")?;

        interactions.push(Interaction::rating(
            parse_field(user_id, FILE, line_no, "userId")?,
            parse_field(movie_id, FILE, line_no, "movieId")?,
            parse_field(rating, FILE, line_no, "rating")?,
            parse_field(timestamp, FILE, line_no, "timestamp")?,
        ));
    }

    Ok(interactions)
}

/// Extract year from movie title
///
/// Example: "Toy Story (1995)" -> Some(1995)
///          "Movie Title" -> None
fn extract_year_from_title(title: &str) -> Option<u16> {
    let start = title.rfind('(')?;
    let end = title.rfind(')')?;
    if start < end {
        return title[start + 1..end].parse::<u16>().ok();
    }
    None
}

/// Split a pipe-separated tag list, dropping empty entries and the
/// "(no genres listed)" placeholder used by newer MovieLens releases
fn parse_tags(s: &str) -> Vec<String> {
    s.split('|')
        .map(str::trim)
        .filter(|tag| !tag.is_empty() && *tag != "(no genres listed)")
        .map(str::to_string)
        .collect()
}
