//! Project templates mounted into the environment

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::types::Framework;

/// Milliseconds the page waits for the app to start before reporting it
const BOOT_WATCHDOG_MS: u32 = 8000;

/// Files of a project, keyed by path relative to the project root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectTree {
    files: BTreeMap<String, String>,
}

impl ProjectTree {
    /// Complete Vite project for `framework` with `source` as its root component
    pub fn for_framework(framework: Framework, source: &str) -> Self {
        let mut tree = Self::default();
        tree.insert("package.json", format!("{:#}\n", package_json(framework)));
        tree.insert("vite.config.js", vite_config(framework));
        tree.insert("tsconfig.json", format!("{:#}\n", tsconfig(framework)));
        tree.insert("index.html", index_html(framework));
        tree.insert(entry_path(framework), entry_script(framework));
        tree.insert(source_path(framework), source);
        tree
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Path of the user's component inside the project
pub fn source_path(framework: Framework) -> &'static str {
    match framework {
        Framework::React => "src/App.tsx",
        Framework::Vue => "src/App.vue",
        Framework::Angular => "src/app/app.component.ts",
    }
}

fn entry_path(framework: Framework) -> &'static str {
    match framework {
        Framework::React => "src/main.tsx",
        Framework::Vue | Framework::Angular => "src/main.ts",
    }
}

fn package_json(framework: Framework) -> Value {
    let (dependencies, dev_dependencies) = match framework {
        Framework::React => (
            json!({
                "react": "^18.3.1",
                "react-dom": "^18.3.1"
            }),
            json!({
                "@types/react": "^18.3.3",
                "@types/react-dom": "^18.3.0",
                "@vitejs/plugin-react": "^4.3.1",
                "typescript": "^5.5.4",
                "vite": "^5.4.0"
            }),
        ),
        Framework::Vue => (
            json!({
                "vue": "^3.4.38"
            }),
            json!({
                "@vitejs/plugin-vue": "^5.1.2",
                "typescript": "^5.5.4",
                "vite": "^5.4.0"
            }),
        ),
        Framework::Angular => (
            json!({
                "@angular/common": "^18.2.0",
                "@angular/compiler": "^18.2.0",
                "@angular/core": "^18.2.0",
                "@angular/forms": "^18.2.0",
                "@angular/platform-browser": "^18.2.0",
                "rxjs": "~7.8.1",
                "tslib": "^2.6.3",
                "zone.js": "~0.14.10"
            }),
            json!({
                "@analogjs/vite-plugin-angular": "^1.7.0",
                "@angular-devkit/build-angular": "^18.2.0",
                "@angular/compiler-cli": "^18.2.0",
                "typescript": "~5.5.4",
                "vite": "^5.4.0"
            }),
        ),
    };

    json!({
        "name": format!("codepad-{framework}"),
        "private": true,
        "version": "0.0.0",
        "type": "module",
        "scripts": {
            "dev": "vite"
        },
        "dependencies": dependencies,
        "devDependencies": dev_dependencies
    })
}

fn vite_config(framework: Framework) -> String {
    let (import, plugin) = match framework {
        Framework::React => ("import react from '@vitejs/plugin-react';", "react()"),
        Framework::Vue => ("import vue from '@vitejs/plugin-vue';", "vue()"),
        Framework::Angular => (
            "import angular from '@analogjs/vite-plugin-angular';",
            "angular()",
        ),
    };

    format!(
        "import {{ defineConfig }} from 'vite';
{import}

export default defineConfig({{
  plugins: [{plugin}],
}});
"
    )
}

fn tsconfig(framework: Framework) -> Value {
    let mut options = json!({
        "target": "ES2022",
        "module": "ESNext",
        "moduleResolution": "bundler",
        "lib": ["ES2022", "DOM", "DOM.Iterable"],
        "strict": true,
        "skipLibCheck": true,
        "isolatedModules": true,
        "noEmit": true
    });

    match framework {
        Framework::React => options["jsx"] = json!("react-jsx"),
        Framework::Vue => options["jsx"] = json!("preserve"),
        Framework::Angular => {
            options["experimentalDecorators"] = json!(true);
            options["useDefineForClassFields"] = json!(false);
            options["isolatedModules"] = json!(false);
        }
    }

    let mut config = json!({
        "compilerOptions": options,
        "include": ["src"]
    });
    if framework == Framework::Angular {
        config["files"] = json!(["src/main.ts"]);
        config["angularCompilerOptions"] = json!({ "strictTemplates": true });
    }
    config
}

fn index_html(framework: Framework) -> String {
    let entry = entry_path(framework);
    let mount = framework.default_mount();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>codepad</title>
    <style>
      #codepad-diagnostics {{
        display: none;
        margin: 16px;
        padding: 12px 16px;
        border-left: 4px solid #e5534b;
        background: #fff1f0;
        color: #8c1d18;
        font: 13px/1.5 ui-monospace, monospace;
        white-space: pre-wrap;
      }}
    </style>
    <script>
      window.__codepadReport = function (message) {{
        var panel = document.getElementById('codepad-diagnostics');
        if (!panel) return;
        panel.textContent = message;
        panel.style.display = 'block';
      }};
      window.addEventListener('error', function (event) {{
        window.__codepadReport('Runtime error: ' + event.message);
      }});
      window.addEventListener('unhandledrejection', function (event) {{
        var reason = event.reason;
        window.__codepadReport('Unhandled rejection: ' + (reason && reason.message ? reason.message : reason));
      }});
      setTimeout(function () {{
        if (!window.__codepadBooted) {{
          window.__codepadReport('The app did not start within {seconds} seconds. Check the terminal output for build errors.');
        }}
      }}, {BOOT_WATCHDOG_MS});
    </script>
  </head>
  <body>
    <div id="codepad-diagnostics"></div>
    {mount}
    <script type="module" src="/{entry}"></script>
  </body>
</html>
"#,
        seconds = BOOT_WATCHDOG_MS / 1000,
    )
}

fn entry_script(framework: Framework) -> String {
    let report = "function reportBootstrapError(error: unknown) {
  const message = error instanceof Error ? error.message : String(error);
  (window as any).__codepadReport?.('Bootstrap failed: ' + message);
  console.error(error);
}
";

    let body = match framework {
        Framework::React => {
            "import { createRoot } from 'react-dom/client';
import App from './App';

try {
  createRoot(document.getElementById('root')!).render(<App />);
  (window as any).__codepadBooted = true;
} catch (error) {
  reportBootstrapError(error);
}
"
        }
        Framework::Vue => {
            "import { createApp } from 'vue';
import App from './App.vue';

try {
  createApp(App).mount('#app');
  (window as any).__codepadBooted = true;
} catch (error) {
  reportBootstrapError(error);
}
"
        }
        Framework::Angular => {
            "import 'zone.js';
import { bootstrapApplication } from '@angular/platform-browser';
import { AppComponent } from './app/app.component';

bootstrapApplication(AppComponent)
  .then(() => {
    (window as any).__codepadBooted = true;
  })
  .catch(reportBootstrapError);
"
        }
    };

    // Imports must stay at the top of the module
    let (imports, rest) = split_imports(body);
    format!("{imports}\n{report}\n{rest}")
}

fn split_imports(body: &str) -> (&str, &str) {
    match body.find("\n\n") {
        Some(idx) => (&body[..idx + 1], &body[idx + 2..]),
        None => ("", body),
    }
}
