//! Brief model statistics for the `-t` flag.

use std::collections::HashSet;

use patchset::Engine;

pub fn print(engine: &Engine) {
    let mut num_files = 0;
    let mut max_file_len = 0;
    let mut total_file_len = 0;
    let mut total_revisions = 0;
    let mut max_revisions = 0;
    let mut total_branches = 0;
    let mut max_branches = 0;
    let mut total_branches_sym = 0;
    let mut max_branches_sym = 0;

    for (_, file) in engine.files() {
        num_files += 1;
        max_file_len = max_file_len.max(file.path.len());
        total_file_len += file.path.len();

        total_revisions += file.revisions.len();
        max_revisions = max_revisions.max(file.revisions.len());
        total_branches += file.branches.len();
        max_branches = max_branches.max(file.branches.len());
        total_branches_sym += file.branches_sym.len();
        max_branches_sym = max_branches_sym.max(file.branches_sym.len());
    }

    println!(
        "Num files: {}\nMax filename len: {}, Average filename len: {:.2}",
        num_files,
        max_file_len,
        ratio(total_file_len, num_files)
    );
    println!(
        "Max revisions for file: {}, Average revisions for file: {:.2}",
        max_revisions,
        ratio(total_revisions, num_files)
    );
    println!(
        "Max branches for file: {}, Average branches for file: {:.2}",
        max_branches,
        ratio(total_branches, num_files)
    );
    println!(
        "Max branches_sym for file: {}, Average branches_sym for file: {:.2}",
        max_branches_sym,
        ratio(total_branches_sym, num_files)
    );

    let mut num_patch_sets = 0;
    let mut num_members = 0;
    let mut max_members = 0;
    let mut authors: HashSet<&str> = HashSet::new();
    let mut max_author_len = 0;
    let mut total_author_len = 0;
    let mut max_descr_len = 0;
    let mut total_descr_len = 0;

    for (_, ps) in engine.patchsets() {
        num_patch_sets += 1;

        if authors.insert(ps.author.as_ref()) {
            max_author_len = max_author_len.max(ps.author.len());
            total_author_len += ps.author.len();
        }

        max_descr_len = max_descr_len.max(ps.descr.len());
        total_descr_len += ps.descr.len();

        num_members += ps.members.len();
        max_members = max_members.max(ps.members.len());
    }

    println!("Num patchsets: {}", num_patch_sets);
    println!(
        "Max PS members in PS: {}\nAverage PS members in PS: {:.2}",
        max_members,
        ratio(num_members, num_patch_sets)
    );
    println!(
        "Num authors: {}, Max author len: {}, Avg. author len: {:.2}",
        authors.len(),
        max_author_len,
        ratio(total_author_len, authors.len())
    );
    println!(
        "Max desc len: {}, Avg. desc len: {:.2}",
        max_descr_len,
        ratio(total_descr_len, num_patch_sets)
    );
}

fn ratio(total: usize, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}
